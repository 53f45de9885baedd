//! HTTP router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`.
//!
//! Middleware stack (outermost → innermost):
//! 1. CORS → 2. Auth validator → 3. Audit logger

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>, allowed_origin: Option<&str>) -> Router {
    let ctx = ApiContext::new(core);

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route(
            "/prescriptions",
            get(endpoints::prescriptions::list).post(endpoints::prescriptions::create),
        )
        .route(
            "/prescriptions/:id",
            get(endpoints::prescriptions::detail)
                .put(endpoints::prescriptions::update)
                .delete(endpoints::prescriptions::remove),
        )
        .route("/pharmacy/prescriptions", get(endpoints::pharmacy::assigned))
        .route(
            "/pharmacy/prescriptions/all",
            get(endpoints::pharmacy::all_pending),
        )
        .route(
            "/pharmacy/prescriptions/patient/:patient_email",
            get(endpoints::pharmacy::by_patient),
        )
        .route(
            "/pharmacy/dispense/:prescription_id",
            post(endpoints::pharmacy::dispense),
        )
        .route(
            "/pharmacy/dispense/:prescription_id/log/:log_id",
            put(endpoints::pharmacy::edit_log),
        )
        .route(
            "/pharmacy/dispense-history",
            get(endpoints::pharmacy::history),
        )
        .with_state(ctx.clone())
        // Middleware stack (innermost first, outermost last):
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    let unprotected = Router::new()
        .route("/health", get(endpoints::health::check))
        .with_state(ctx);

    Router::new()
        .nest("/api", protected)
        .nest("/api", unprotected)
        .layer(cors_layer(allowed_origin))
}

/// CORS for the browser client. Without a configured origin any origin is
/// accepted (bearer tokens, no cookies).
fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    match allowed_origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => base.allow_origin(AllowOrigin::exact(origin)),
        Some(Err(_)) => {
            tracing::warn!("Ignoring malformed allowed origin, accepting any");
            base.allow_origin(Any)
        }
        None => base.allow_origin(Any),
    }
}
