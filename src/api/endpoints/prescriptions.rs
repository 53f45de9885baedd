//! Prescription endpoints.
//!
//! - `GET    /api/prescriptions`: caller's own prescriptions
//! - `POST   /api/prescriptions`: create (doctor)
//! - `GET    /api/prescriptions/:id`: single prescription, if visible
//! - `PUT    /api/prescriptions/:id`: update (prescribing doctor)
//! - `DELETE /api/prescriptions/:id`: delete (prescribing doctor)

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use super::{parse_id, request_body};
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{Actor, Prescription};
use crate::prescriptions;

const NOT_FOUND: &str = "Prescription not found";

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<Prescription>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(prescriptions::list_own_prescriptions(&conn, &actor)?))
}

pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    body: Bytes,
) -> Result<(StatusCode, Json<Prescription>), ApiError> {
    let conn = ctx.core.open_db()?;
    let rx = prescriptions::create_prescription(&conn, &actor, request_body(body))?;
    Ok((StatusCode::CREATED, Json(rx)))
}

pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<Prescription>, ApiError> {
    let id = parse_id(&id, NOT_FOUND)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(prescriptions::fetch_prescription(&conn, &actor, &id)?))
}

pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Prescription>, ApiError> {
    let id = parse_id(&id, NOT_FOUND)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(prescriptions::update_prescription(
        &conn,
        &actor,
        &id,
        request_body(body),
    )?))
}

pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_id(&id, NOT_FOUND)?;
    let conn = ctx.core.open_db()?;
    prescriptions::delete_prescription(&conn, &actor, &id)?;
    Ok(Json(MessageResponse {
        message: "Prescription deleted",
    }))
}
