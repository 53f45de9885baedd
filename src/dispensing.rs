//! Dispense service: pharmacy-facing listings and fulfilment.
//!
//! Every operation requires a pharmacy caller. Listings carry a summary of
//! the prescribing doctor when that account is known locally.

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access;
use crate::db::{self, PrescriptionFilter};
use crate::error::ServiceError;
use crate::models::enums::DispenseStatus;
use crate::models::fields::{lenient_int, RequestBody};
use crate::models::{
    Actor, DispenseEntryError, DispenseEntryPatch, NewDispense, PrescriberSummary, Prescription,
};
use crate::prescriptions;

/// Prescription as listed to a pharmacy.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PharmacyPrescriptionView {
    #[serde(flatten)]
    pub prescription: Prescription,
    pub prescriber: Option<PrescriberSummary>,
}

/// Body of a dispense or log-edit request.
///
/// `quantityDispensed` given as `""` or `null` reads as absent on both
/// routes: a dispense then records the full prescribed quantity, and a log
/// edit keeps the entry's current quantity.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseInput {
    #[serde(default, deserialize_with = "lenient_int")]
    pub quantity_dispensed: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

pub fn list_assigned(
    conn: &Connection,
    actor: &Actor,
) -> Result<Vec<PharmacyPrescriptionView>, ServiceError> {
    access::require_pharmacy(actor)?;
    list_views(
        conn,
        &PrescriptionFilter {
            pharmacy_email: Some(actor.email.clone()),
            ..Default::default()
        },
    )
}

/// Every undispensed prescription, whichever pharmacy it is assigned to.
pub fn list_all_pending(
    conn: &Connection,
    actor: &Actor,
) -> Result<Vec<PharmacyPrescriptionView>, ServiceError> {
    access::require_pharmacy(actor)?;
    list_views(
        conn,
        &PrescriptionFilter {
            is_dispensed: Some(false),
            ..Default::default()
        },
    )
}

pub fn list_by_patient(
    conn: &Connection,
    actor: &Actor,
    patient_email: &str,
) -> Result<Vec<PharmacyPrescriptionView>, ServiceError> {
    access::require_pharmacy(actor)?;
    list_views(
        conn,
        &PrescriptionFilter {
            patient_email: Some(patient_email.to_string()),
            visible_to_pharmacy: Some(actor.email.clone()),
            ..Default::default()
        },
    )
}

pub fn list_history(
    conn: &Connection,
    actor: &Actor,
) -> Result<Vec<PharmacyPrescriptionView>, ServiceError> {
    access::require_pharmacy(actor)?;
    list_views(
        conn,
        &PrescriptionFilter {
            pharmacy_email: Some(actor.email.clone()),
            is_dispensed: Some(true),
            ..Default::default()
        },
    )
}

/// Append a dispense entry. Blank quantity and status fall back to the full
/// prescribed quantity and `Dispensed`.
pub fn dispense(
    conn: &Connection,
    actor: &Actor,
    prescription_id: &Uuid,
    body: impl Into<RequestBody<DispenseInput>>,
) -> Result<Prescription, ServiceError> {
    access::require_pharmacy(actor)?;
    let mut rx = prescriptions::load(conn, prescription_id)?;

    let input = body.into().decode().map_err(ServiceError::malformed_body)?;
    let status = match input.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(parse_status(raw)?),
    };

    let entry_id = rx
        .append_dispense_entry(
            actor,
            NewDispense {
                quantity_dispensed: input.quantity_dispensed,
                status,
            },
            Utc::now(),
        )
        .id;
    db::save_prescription(conn, &mut rx)?;

    tracing::info!(
        prescription_id = %rx.id,
        entry_id = %entry_id,
        actor_id = %actor.id,
        is_dispensed = rx.is_dispensed(),
        "Dispense recorded"
    );
    Ok(rx)
}

/// Edit a dispense entry written by the caller. Fields apply by presence, so
/// a quantity of zero is written as given. The prescription and entry are
/// resolved, and authorship checked, before the body is read.
pub fn edit_log_entry(
    conn: &Connection,
    actor: &Actor,
    prescription_id: &Uuid,
    entry_id: &Uuid,
    body: impl Into<RequestBody<DispenseInput>>,
) -> Result<Prescription, ServiceError> {
    access::require_pharmacy(actor)?;
    let mut rx = prescriptions::load(conn, prescription_id)?;
    let entry = rx
        .dispense_entry(entry_id)
        .ok_or_else(|| entry_error(DispenseEntryError::NotFound))?;
    if !access::owns_log_entry(actor, entry) {
        return Err(entry_error(DispenseEntryError::NotAuthor));
    }

    let input = body.into().decode().map_err(ServiceError::malformed_body)?;
    let patch = DispenseEntryPatch {
        quantity_dispensed: input.quantity_dispensed,
        status: input.status.as_deref().map(parse_status).transpose()?,
    };

    rx.update_dispense_entry(entry_id, actor, patch, Utc::now())
        .map_err(entry_error)?;
    db::save_prescription(conn, &mut rx)?;

    tracing::info!(
        prescription_id = %rx.id,
        entry_id = %entry_id,
        actor_id = %actor.id,
        is_dispensed = rx.is_dispensed(),
        "Dispense entry updated"
    );
    Ok(rx)
}

fn entry_error(err: DispenseEntryError) -> ServiceError {
    match err {
        DispenseEntryError::NotFound => ServiceError::NotFound(err.to_string()),
        DispenseEntryError::NotAuthor => ServiceError::Permission(err.to_string()),
    }
}

fn parse_status(raw: &str) -> Result<DispenseStatus, ServiceError> {
    DispenseStatus::parse_input(raw).ok_or_else(|| {
        ServiceError::Validation(format!(
            "Dispense validation failed: status \"{raw}\" is not one of Pending, Dispensed"
        ))
    })
}

fn list_views(
    conn: &Connection,
    filter: &PrescriptionFilter,
) -> Result<Vec<PharmacyPrescriptionView>, ServiceError> {
    let prescriptions = db::list_prescriptions(conn, filter)?;
    let ids: Vec<Uuid> = prescriptions.iter().map(|rx| rx.created_by_user_id).collect();
    let summaries = db::get_prescriber_summaries(conn, &ids)?;

    Ok(prescriptions
        .into_iter()
        .map(|rx| {
            let prescriber = summaries.get(&rx.created_by_user_id).cloned();
            PharmacyPrescriptionView {
                prescription: rx,
                prescriber,
            }
        })
        .collect())
}
