//! Prescription service: doctor-facing create/read/update/delete.
//!
//! Only doctors write prescriptions, and only the prescribing doctor may
//! change or remove one. Updates are truthy-or-keep per field, except the
//! pharmacy assignment, which an explicit empty value clears.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Deserialize;
use uuid::Uuid;

use crate::access;
use crate::db::{self, PrescriptionFilter};
use crate::error::ServiceError;
use crate::models::fields::{lenient_int, presence, RequestBody};
use crate::models::{Actor, Prescription, PrescriptionDetails, PrescriptionPatch};

/// Prescription fields as posted by the client, for both create and update.
/// Dispense state (`isDispensed`, `dispenseLog`) is not accepted here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionInput {
    pub prescription_date: Option<String>,
    pub medication_name: Option<String>,
    pub medication_strength: Option<String>,
    pub medication_form: Option<String>,
    pub direction_of_use: Option<String>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub quantity: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub repeats: Option<i64>,
    pub patient_name: Option<String>,
    pub patient_email: Option<String>,
    #[serde(default, deserialize_with = "presence")]
    pub pharmacy_email: Option<Option<String>>,
}

/// All prescriptions written by the caller.
pub fn list_own_prescriptions(
    conn: &Connection,
    actor: &Actor,
) -> Result<Vec<Prescription>, ServiceError> {
    let filter = PrescriptionFilter {
        created_by: Some(actor.id),
        ..Default::default()
    };
    Ok(db::list_prescriptions(conn, &filter)?)
}

/// A single prescription, if the caller may see it.
pub fn fetch_prescription(
    conn: &Connection,
    actor: &Actor,
    id: &Uuid,
) -> Result<Prescription, ServiceError> {
    let rx = load(conn, id)?;
    if !access::can_view_prescription(actor, &rx) {
        return Err(ServiceError::Permission(
            "Not authorised to view this prescription".into(),
        ));
    }
    Ok(rx)
}

pub fn create_prescription(
    conn: &Connection,
    actor: &Actor,
    body: impl Into<RequestBody<PrescriptionInput>>,
) -> Result<Prescription, ServiceError> {
    access::require_doctor(actor)?;
    let input = body.into().decode().map_err(ServiceError::malformed_body)?;
    let details = validate_new(input)?;

    let rx = Prescription::new(actor.id, details, Utc::now());
    db::insert_prescription(conn, &rx)?;

    tracing::info!(
        prescription_id = %rx.id,
        actor_id = %actor.id,
        assigned = !rx.details.is_unassigned(),
        "Prescription created"
    );
    Ok(rx)
}

pub fn update_prescription(
    conn: &Connection,
    actor: &Actor,
    id: &Uuid,
    body: impl Into<RequestBody<PrescriptionInput>>,
) -> Result<Prescription, ServiceError> {
    let mut rx = load(conn, id)?;
    if !access::owns_prescription(actor, &rx) {
        return Err(ServiceError::Permission(
            "Not authorised to update this prescription".into(),
        ));
    }

    let input = body.into().decode().map_err(ServiceError::malformed_body)?;
    let patch = validate_patch(input)?;
    rx.apply_patch(patch, Utc::now());
    db::save_prescription(conn, &mut rx)?;

    tracing::info!(prescription_id = %rx.id, actor_id = %actor.id, "Prescription updated");
    Ok(rx)
}

pub fn delete_prescription(
    conn: &Connection,
    actor: &Actor,
    id: &Uuid,
) -> Result<(), ServiceError> {
    let rx = load(conn, id)?;
    if !access::owns_prescription(actor, &rx) {
        return Err(ServiceError::Permission(
            "Not authorised to delete this prescription".into(),
        ));
    }

    if !db::delete_prescription(conn, id)? {
        return Err(ServiceError::NotFound("Prescription not found".into()));
    }

    tracing::info!(prescription_id = %id, actor_id = %actor.id, "Prescription deleted");
    Ok(())
}

pub(crate) fn load(conn: &Connection, id: &Uuid) -> Result<Prescription, ServiceError> {
    db::get_prescription(conn, id)?
        .ok_or_else(|| ServiceError::NotFound("Prescription not found".into()))
}

// ═══════════════════════════════════════════
// Validation
// ═══════════════════════════════════════════

fn validate_new(input: PrescriptionInput) -> Result<PrescriptionDetails, ServiceError> {
    let mut problems = Vec::new();

    let prescription_date = match non_empty(input.prescription_date) {
        Some(raw) => parse_date(&raw).or_else(|| {
            problems.push(format!("prescriptionDate \"{raw}\" is not a valid date"));
            None
        }),
        None => {
            problems.push("prescriptionDate is required".to_string());
            None
        }
    };

    let mut required = |name: &str, value: Option<String>| -> String {
        match non_empty(value) {
            Some(v) => v,
            None => {
                problems.push(format!("{name} is required"));
                String::new()
            }
        }
    };
    let medication_name = required("medicationName", input.medication_name);
    let medication_strength = required("medicationStrength", input.medication_strength);
    let medication_form = required("medicationForm", input.medication_form);
    let direction_of_use = required("directionOfUse", input.direction_of_use);
    let patient_name = required("patientName", input.patient_name);
    let patient_email = required("patientEmail", input.patient_email);

    match input.quantity {
        None => problems.push("quantity is required".into()),
        Some(q) if q <= 0 => problems.push("quantity must be a positive whole number".into()),
        Some(_) => {}
    }
    match input.repeats {
        None => problems.push("repeats is required".into()),
        Some(r) if r < 0 => problems.push("repeats must not be negative".into()),
        Some(_) => {}
    }

    let Some(prescription_date) = prescription_date.filter(|_| problems.is_empty()) else {
        return Err(validation_error(problems));
    };

    Ok(PrescriptionDetails {
        prescription_date,
        medication_name,
        medication_strength,
        medication_form,
        direction_of_use,
        quantity: input.quantity.unwrap_or_default(),
        repeats: input.repeats.unwrap_or_default(),
        patient_name,
        patient_email,
        pharmacy_email: input.pharmacy_email.flatten().filter(|e| !e.is_empty()),
    })
}

fn validate_patch(input: PrescriptionInput) -> Result<PrescriptionPatch, ServiceError> {
    let mut problems = Vec::new();

    let prescription_date = match non_empty(input.prescription_date) {
        Some(raw) => parse_date(&raw).or_else(|| {
            problems.push(format!("prescriptionDate \"{raw}\" is not a valid date"));
            None
        }),
        None => None,
    };
    if matches!(input.quantity, Some(q) if q < 0) {
        problems.push("quantity must be a positive whole number".into());
    }
    if matches!(input.repeats, Some(r) if r < 0) {
        problems.push("repeats must not be negative".into());
    }

    if !problems.is_empty() {
        return Err(validation_error(problems));
    }

    Ok(PrescriptionPatch {
        prescription_date,
        medication_name: input.medication_name,
        medication_strength: input.medication_strength,
        medication_form: input.medication_form,
        direction_of_use: input.direction_of_use,
        quantity: input.quantity,
        repeats: input.repeats,
        patient_name: input.patient_name,
        patient_email: input.patient_email,
        pharmacy_email: input.pharmacy_email,
    })
}

fn validation_error(problems: Vec<String>) -> ServiceError {
    ServiceError::Validation(format!(
        "Prescription validation failed: {}",
        problems.join(", ")
    ))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Accepts `YYYY-MM-DD` (date inputs) or a full RFC 3339 timestamp.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}
