//! Access control gate.
//!
//! Pure predicates over an already-authenticated `Actor`. Role checks match
//! exhaustively on `Role` so a new role has to be placed explicitly.
//!
//! Visibility of a single prescription, checked in order:
//! 1. Prescribing doctor → VISIBLE
//! 2. Pharmacy the prescription is assigned to → VISIBLE
//! 3. Any pharmacy while unassigned → VISIBLE
//! 4. Patient named on the prescription → VISIBLE
//! 5. Default → DENY

use crate::error::ServiceError;
use crate::models::enums::Role;
use crate::models::{Actor, DispenseLogEntry, Prescription};

pub fn is_doctor(actor: &Actor) -> bool {
    match actor.role {
        Role::Doctor => true,
        Role::Pharmacy | Role::Patient => false,
    }
}

pub fn is_pharmacy(actor: &Actor) -> bool {
    match actor.role {
        Role::Pharmacy => true,
        Role::Doctor | Role::Patient => false,
    }
}

pub fn owns_prescription(actor: &Actor, prescription: &Prescription) -> bool {
    actor.id == prescription.created_by_user_id
}

pub fn owns_log_entry(actor: &Actor, entry: &DispenseLogEntry) -> bool {
    actor.id == entry.dispensed_by
}

pub fn can_view_prescription(actor: &Actor, prescription: &Prescription) -> bool {
    match actor.role {
        Role::Doctor => owns_prescription(actor, prescription),
        Role::Pharmacy => {
            prescription.details.is_unassigned()
                || prescription.details.is_assigned_to(&actor.email)
        }
        Role::Patient => prescription.details.patient_email == actor.email,
    }
}

pub fn require_doctor(actor: &Actor) -> Result<(), ServiceError> {
    if is_doctor(actor) {
        Ok(())
    } else {
        Err(ServiceError::Permission(
            "Only doctors can create prescriptions".into(),
        ))
    }
}

pub fn require_pharmacy(actor: &Actor) -> Result<(), ServiceError> {
    if is_pharmacy(actor) {
        Ok(())
    } else {
        Err(ServiceError::Permission("Access denied. Pharmacy only.".into()))
    }
}
