//! Audit logging middleware.
//!
//! Logs every protected request with actor, method, path and response
//! status. Runs innermost (after auth has injected the `Actor`).

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::models::Actor;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    let actor = req
        .extensions()
        .get::<Actor>()
        .map(|a| (a.id.to_string(), a.role.as_str()));

    let response = next.run(req).await;

    let status = response.status().as_u16();
    match actor {
        Some((actor_id, role)) => {
            tracing::info!(%method, %path, %actor_id, role, status, "API access");
        }
        None => tracing::info!(%method, %path, status, "API access"),
    }

    response
}
