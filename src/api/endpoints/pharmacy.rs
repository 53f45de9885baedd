//! Pharmacy endpoints. All require a pharmacy caller.
//!
//! - `GET  /api/pharmacy/prescriptions`: assigned to the caller
//! - `GET  /api/pharmacy/prescriptions/all`: every pending prescription
//! - `GET  /api/pharmacy/prescriptions/patient/:patientEmail`
//! - `POST /api/pharmacy/dispense/:prescriptionId`
//! - `PUT  /api/pharmacy/dispense/:prescriptionId/log/:logId`
//! - `GET  /api/pharmacy/dispense-history`

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;

use super::{parse_id, request_body};
use crate::access;
use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::dispensing::{self, PharmacyPrescriptionView};
use crate::models::{Actor, Prescription};

#[derive(Serialize)]
pub struct DispenseResponse {
    pub message: &'static str,
    pub prescription: Prescription,
}

pub async fn assigned(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<PharmacyPrescriptionView>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(dispensing::list_assigned(&conn, &actor)?))
}

pub async fn all_pending(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<PharmacyPrescriptionView>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(dispensing::list_all_pending(&conn, &actor)?))
}

pub async fn by_patient(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(patient_email): Path<String>,
) -> Result<Json<Vec<PharmacyPrescriptionView>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(dispensing::list_by_patient(&conn, &actor, &patient_email)?))
}

pub async fn history(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<PharmacyPrescriptionView>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(dispensing::list_history(&conn, &actor)?))
}

pub async fn dispense(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path(prescription_id): Path<String>,
    body: Bytes,
) -> Result<Json<DispenseResponse>, ApiError> {
    // Role first: non-pharmacy callers get 403 whatever the path holds.
    access::require_pharmacy(&actor)?;
    let id = parse_id(&prescription_id, "Prescription not found")?;
    let conn = ctx.core.open_db()?;
    let prescription = dispensing::dispense(&conn, &actor, &id, request_body(body))?;
    Ok(Json(DispenseResponse {
        message: "Prescription dispensed successfully",
        prescription,
    }))
}

pub async fn edit_log(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<Actor>,
    Path((prescription_id, log_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<DispenseResponse>, ApiError> {
    access::require_pharmacy(&actor)?;
    let prescription_id = parse_id(&prescription_id, "Prescription not found")?;
    let log_id = parse_id(&log_id, "Dispense log entry not found")?;
    let conn = ctx.core.open_db()?;
    let prescription = dispensing::edit_log_entry(
        &conn,
        &actor,
        &prescription_id,
        &log_id,
        request_body(body),
    )?;
    Ok(Json(DispenseResponse {
        message: "Dispense log updated successfully",
        prescription,
    }))
}
