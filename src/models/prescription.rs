use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::Actor;
use super::enums::DispenseStatus;
use crate::access;

/// Doctor-authored fields of a prescription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionDetails {
    pub prescription_date: NaiveDate,
    pub medication_name: String,
    pub medication_strength: String,
    pub medication_form: String,
    pub direction_of_use: String,
    pub quantity: i64,
    pub repeats: i64,
    pub patient_name: String,
    pub patient_email: String,
    /// `None` means unassigned: any pharmacy may find it by patient.
    pub pharmacy_email: Option<String>,
}

impl PrescriptionDetails {
    pub fn is_unassigned(&self) -> bool {
        self.pharmacy_email.as_deref().map_or(true, str::is_empty)
    }

    pub fn is_assigned_to(&self, pharmacy_email: &str) -> bool {
        self.pharmacy_email.as_deref() == Some(pharmacy_email)
    }
}

/// One fulfilment action against a prescription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseLogEntry {
    pub id: Uuid,
    pub dispensed_by: Uuid,
    pub dispensed_by_name: String,
    pub dispensed_date: DateTime<Utc>,
    pub quantity_dispensed: i64,
    pub status: DispenseStatus,
}

/// Input for a new dispense entry. Unset fields take the prescription's
/// defaults (full quantity, `Dispensed`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewDispense {
    pub quantity_dispensed: Option<i64>,
    pub status: Option<DispenseStatus>,
}

/// Field-by-field edit of an existing entry. `Some` means "write this value".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispenseEntryPatch {
    pub quantity_dispensed: Option<i64>,
    pub status: Option<DispenseStatus>,
}

/// Doctor edit of a prescription. Every field is truthy-or-keep except
/// `pharmacy_email`, where `Some(None)` clears the assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrescriptionPatch {
    pub prescription_date: Option<NaiveDate>,
    pub medication_name: Option<String>,
    pub medication_strength: Option<String>,
    pub medication_form: Option<String>,
    pub direction_of_use: Option<String>,
    pub quantity: Option<i64>,
    pub repeats: Option<i64>,
    pub patient_name: Option<String>,
    pub patient_email: Option<String>,
    pub pharmacy_email: Option<Option<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DispenseEntryError {
    #[error("Dispense log entry not found")]
    NotFound,
    #[error("You can only edit your own dispense logs")]
    NotAuthor,
}

/// Prescription aggregate. The dispense log and the dispensed flag are only
/// reachable for writing through the methods below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: Uuid,
    pub created_by_user_id: Uuid,
    #[serde(flatten)]
    pub details: PrescriptionDetails,
    is_dispensed: bool,
    dispense_log: Vec<DispenseLogEntry>,
    revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prescription {
    /// A freshly written prescription: not dispensed, empty log.
    pub fn new(created_by: Uuid, details: PrescriptionDetails, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_by_user_id: created_by,
            details: normalize_assignment(details),
            is_dispensed: false,
            dispense_log: Vec::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild from stored state.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid,
        created_by: Uuid,
        details: PrescriptionDetails,
        is_dispensed: bool,
        dispense_log: Vec<DispenseLogEntry>,
        revision: i64,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            created_by_user_id: created_by,
            details,
            is_dispensed,
            dispense_log,
            revision,
            created_at,
            updated_at,
        }
    }

    pub fn is_dispensed(&self) -> bool {
        self.is_dispensed
    }

    pub fn dispense_log(&self) -> &[DispenseLogEntry] {
        &self.dispense_log
    }

    /// The log entry with `entry_id`, if present.
    pub fn dispense_entry(&self, entry_id: &Uuid) -> Option<&DispenseLogEntry> {
        self.dispense_log.iter().find(|e| &e.id == entry_id)
    }

    /// Revision this copy was loaded at. Writes are accepted only against it.
    pub fn revision(&self) -> i64 {
        self.revision
    }

    pub(crate) fn mark_saved(&mut self) {
        self.revision += 1;
    }

    /// Apply a doctor edit. Blank strings and zero numbers keep the current
    /// value; `pharmacy_email` follows presence instead.
    pub fn apply_patch(&mut self, patch: PrescriptionPatch, now: DateTime<Utc>) {
        let d = &mut self.details;
        if let Some(date) = patch.prescription_date {
            d.prescription_date = date;
        }
        keep_or_replace(&mut d.medication_name, patch.medication_name);
        keep_or_replace(&mut d.medication_strength, patch.medication_strength);
        keep_or_replace(&mut d.medication_form, patch.medication_form);
        keep_or_replace(&mut d.direction_of_use, patch.direction_of_use);
        keep_or_replace(&mut d.patient_name, patch.patient_name);
        keep_or_replace(&mut d.patient_email, patch.patient_email);
        if let Some(quantity) = patch.quantity.filter(|q| *q != 0) {
            d.quantity = quantity;
        }
        if let Some(repeats) = patch.repeats.filter(|r| *r != 0) {
            d.repeats = repeats;
        }
        if let Some(pharmacy_email) = patch.pharmacy_email {
            d.pharmacy_email = pharmacy_email.filter(|e| !e.is_empty());
        }
        self.updated_at = now;
    }

    /// Record a dispense by `actor`. A resulting `Dispensed` status marks the
    /// prescription dispensed; any other status leaves the flag alone.
    pub fn append_dispense_entry(
        &mut self,
        actor: &Actor,
        dispense: NewDispense,
        now: DateTime<Utc>,
    ) -> &DispenseLogEntry {
        let status = dispense.status.unwrap_or(DispenseStatus::Dispensed);
        let entry = DispenseLogEntry {
            id: Uuid::new_v4(),
            dispensed_by: actor.id,
            dispensed_by_name: actor.name.clone(),
            dispensed_date: now,
            quantity_dispensed: dispense
                .quantity_dispensed
                .filter(|q| *q != 0)
                .unwrap_or(self.details.quantity),
            status,
        };
        if status == DispenseStatus::Dispensed {
            self.is_dispensed = true;
        }
        self.updated_at = now;
        self.dispense_log.push(entry);
        &self.dispense_log[self.dispense_log.len() - 1]
    }

    /// Edit an entry previously written by `actor`. Each status write sets the
    /// dispensed flag from that status alone, whatever the other entries say.
    pub fn update_dispense_entry(
        &mut self,
        entry_id: &Uuid,
        actor: &Actor,
        patch: DispenseEntryPatch,
        now: DateTime<Utc>,
    ) -> Result<&DispenseLogEntry, DispenseEntryError> {
        let idx = self
            .dispense_log
            .iter()
            .position(|e| &e.id == entry_id)
            .ok_or(DispenseEntryError::NotFound)?;

        if !access::owns_log_entry(actor, &self.dispense_log[idx]) {
            return Err(DispenseEntryError::NotAuthor);
        }

        let entry = &mut self.dispense_log[idx];
        if let Some(quantity) = patch.quantity_dispensed {
            entry.quantity_dispensed = quantity;
        }
        if let Some(status) = patch.status {
            entry.status = status;
            self.is_dispensed = status == DispenseStatus::Dispensed;
        }
        self.updated_at = now;
        Ok(&self.dispense_log[idx])
    }
}

fn keep_or_replace(field: &mut String, value: Option<String>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        *field = v;
    }
}

fn normalize_assignment(mut details: PrescriptionDetails) -> PrescriptionDetails {
    details.pharmacy_email = details.pharmacy_email.filter(|e| !e.is_empty());
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::Role;

    fn details() -> PrescriptionDetails {
        PrescriptionDetails {
            prescription_date: NaiveDate::from_ymd_opt(2025, 8, 12).unwrap(),
            medication_name: "Amoxicillin".into(),
            medication_strength: "500mg".into(),
            medication_form: "Capsule".into(),
            direction_of_use: "Take ONE capsule THREE times a day".into(),
            quantity: 30,
            repeats: 2,
            patient_name: "John Doe".into(),
            patient_email: "john@patient.com".into(),
            pharmacy_email: Some("rx@x.com".into()),
        }
    }

    fn pharmacy(name: &str) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            role: Role::Pharmacy,
            email: format!("{name}@pharmacy.com"),
            name: name.into(),
        }
    }

    fn fresh() -> Prescription {
        Prescription::new(Uuid::new_v4(), details(), Utc::now())
    }

    #[test]
    fn new_prescription_starts_undispensed_with_empty_log() {
        let rx = fresh();
        assert!(!rx.is_dispensed());
        assert!(rx.dispense_log().is_empty());
        assert_eq!(rx.revision(), 0);
    }

    #[test]
    fn empty_pharmacy_email_is_unassigned() {
        let mut d = details();
        d.pharmacy_email = Some(String::new());
        let rx = Prescription::new(Uuid::new_v4(), d, Utc::now());
        assert_eq!(rx.details.pharmacy_email, None);
        assert!(rx.details.is_unassigned());
    }

    #[test]
    fn patch_ignores_blank_and_zero_values() {
        let mut rx = fresh();
        rx.apply_patch(
            PrescriptionPatch {
                medication_name: Some(String::new()),
                quantity: Some(0),
                repeats: Some(0),
                ..Default::default()
            },
            Utc::now(),
        );
        assert_eq!(rx.details.medication_name, "Amoxicillin");
        assert_eq!(rx.details.quantity, 30);
        assert_eq!(rx.details.repeats, 2);
    }

    #[test]
    fn patch_replaces_truthy_values() {
        let mut rx = fresh();
        rx.apply_patch(
            PrescriptionPatch {
                medication_name: Some("Ibuprofen".into()),
                quantity: Some(10),
                ..Default::default()
            },
            Utc::now(),
        );
        assert_eq!(rx.details.medication_name, "Ibuprofen");
        assert_eq!(rx.details.quantity, 10);
    }

    #[test]
    fn patch_clears_pharmacy_with_empty_string() {
        let mut rx = fresh();
        rx.apply_patch(
            PrescriptionPatch {
                pharmacy_email: Some(Some(String::new())),
                ..Default::default()
            },
            Utc::now(),
        );
        assert!(rx.details.is_unassigned());
    }

    #[test]
    fn patch_without_pharmacy_key_keeps_assignment() {
        let mut rx = fresh();
        rx.apply_patch(PrescriptionPatch::default(), Utc::now());
        assert!(rx.details.is_assigned_to("rx@x.com"));
    }

    #[test]
    fn append_defaults_to_full_quantity_and_dispensed() {
        let mut rx = fresh();
        let actor = pharmacy("rx");
        let entry = rx
            .append_dispense_entry(&actor, NewDispense::default(), Utc::now())
            .clone();
        assert_eq!(entry.quantity_dispensed, 30);
        assert_eq!(entry.status, DispenseStatus::Dispensed);
        assert_eq!(entry.dispensed_by, actor.id);
        assert_eq!(entry.dispensed_by_name, "rx");
        assert!(rx.is_dispensed());
    }

    #[test]
    fn append_pending_leaves_flag_untouched() {
        let mut rx = fresh();
        let actor = pharmacy("rx");
        rx.append_dispense_entry(
            &actor,
            NewDispense {
                quantity_dispensed: Some(10),
                status: Some(DispenseStatus::Pending),
            },
            Utc::now(),
        );
        assert!(!rx.is_dispensed());

        rx.append_dispense_entry(&actor, NewDispense::default(), Utc::now());
        assert!(rx.is_dispensed());
        rx.append_dispense_entry(
            &actor,
            NewDispense {
                status: Some(DispenseStatus::Pending),
                ..Default::default()
            },
            Utc::now(),
        );
        assert!(rx.is_dispensed(), "pending append must not reopen");
        assert_eq!(rx.dispense_log().len(), 3);
    }

    #[test]
    fn update_by_non_author_is_rejected_and_entry_kept() {
        let mut rx = fresh();
        let author = pharmacy("a");
        let other = pharmacy("b");
        let entry_id = rx
            .append_dispense_entry(&author, NewDispense::default(), Utc::now())
            .id;
        let before = rx.clone();

        let err = rx
            .update_dispense_entry(
                &entry_id,
                &other,
                DispenseEntryPatch {
                    quantity_dispensed: Some(1),
                    status: Some(DispenseStatus::Pending),
                },
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err, DispenseEntryError::NotAuthor);
        assert_eq!(rx, before);
    }

    #[test]
    fn update_unknown_entry_is_not_found() {
        let mut rx = fresh();
        let err = rx
            .update_dispense_entry(
                &Uuid::new_v4(),
                &pharmacy("a"),
                DispenseEntryPatch::default(),
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err, DispenseEntryError::NotFound);
    }

    #[test]
    fn pending_edit_clears_flag_even_with_other_dispensed_entries() {
        let mut rx = fresh();
        let actor = pharmacy("a");
        rx.append_dispense_entry(&actor, NewDispense::default(), Utc::now());
        let second = rx
            .append_dispense_entry(&actor, NewDispense::default(), Utc::now())
            .id;
        assert!(rx.is_dispensed());

        rx.update_dispense_entry(
            &second,
            &actor,
            DispenseEntryPatch {
                status: Some(DispenseStatus::Pending),
                ..Default::default()
            },
            Utc::now(),
        )
        .unwrap();

        assert!(!rx.is_dispensed());
        assert_eq!(rx.dispense_log()[0].status, DispenseStatus::Dispensed);
    }

    #[test]
    fn quantity_only_edit_keeps_flag_and_accepts_zero() {
        let mut rx = fresh();
        let actor = pharmacy("a");
        let id = rx
            .append_dispense_entry(&actor, NewDispense::default(), Utc::now())
            .id;
        let entry = rx
            .update_dispense_entry(
                &id,
                &actor,
                DispenseEntryPatch {
                    quantity_dispensed: Some(0),
                    status: None,
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(entry.quantity_dispensed, 0);
        assert!(rx.is_dispensed());
    }

    #[test]
    fn serializes_camel_case_with_flattened_details() {
        let rx = fresh();
        let json = serde_json::to_value(&rx).unwrap();
        assert_eq!(json["medicationName"], "Amoxicillin");
        assert_eq!(json["isDispensed"], false);
        assert_eq!(json["pharmacyEmail"], "rx@x.com");
        assert!(json["dispenseLog"].as_array().unwrap().is_empty());
        assert!(json.get("createdByUserId").is_some());
    }
}
