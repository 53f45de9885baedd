//! Prescription store. A prescription and its dispense log are read and
//! written as one aggregate; every write is checked against the revision the
//! aggregate was loaded at.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::DispenseStatus;
use crate::models::{DispenseLogEntry, Prescription, PrescriptionDetails};

const ENTITY: &str = "prescription";

/// Row selection for prescription listings. Unset fields do not filter.
#[derive(Debug, Default, Clone)]
pub struct PrescriptionFilter {
    pub created_by: Option<Uuid>,
    pub pharmacy_email: Option<String>,
    pub patient_email: Option<String>,
    /// Assigned to this pharmacy, or not assigned to any.
    pub visible_to_pharmacy: Option<String>,
    pub is_dispensed: Option<bool>,
}

pub fn insert_prescription(conn: &Connection, rx: &Prescription) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let d = &rx.details;
    tx.execute(
        "INSERT INTO prescriptions (id, created_by, prescription_date, medication_name,
         medication_strength, medication_form, direction_of_use, quantity, repeats,
         is_dispensed, patient_name, patient_email, pharmacy_email, revision,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            rx.id.to_string(),
            rx.created_by_user_id.to_string(),
            d.prescription_date.to_string(),
            d.medication_name,
            d.medication_strength,
            d.medication_form,
            d.direction_of_use,
            d.quantity,
            d.repeats,
            rx.is_dispensed() as i32,
            d.patient_name,
            d.patient_email,
            d.pharmacy_email,
            rx.revision(),
            rx.created_at.to_rfc3339(),
            rx.updated_at.to_rfc3339(),
        ],
    )
    .map_err(DatabaseError::from_write)?;
    insert_log_entries(&tx, &rx.id, rx.dispense_log())?;
    tx.commit()?;
    Ok(())
}

/// Load one aggregate. The row and its log are read in one transaction so a
/// concurrent save cannot interleave between them.
pub fn get_prescription(conn: &Connection, id: &Uuid) -> Result<Option<Prescription>, DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let row = tx
        .prepare(&format!("{SELECT_PRESCRIPTION} WHERE id = ?1"))?
        .query_row(params![id.to_string()], prescription_row_from_rusqlite)
        .optional()?;

    let prescription = match row {
        Some(row) => {
            let log = get_dispense_log(&tx, id)?;
            Some(prescription_from_row(row, log)?)
        }
        None => None,
    };
    tx.commit()?;
    Ok(prescription)
}

pub fn list_prescriptions(
    conn: &Connection,
    filter: &PrescriptionFilter,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut sql = format!("{SELECT_PRESCRIPTION} WHERE 1=1");
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut param_idx = 1;

    if let Some(created_by) = &filter.created_by {
        sql.push_str(&format!(" AND created_by = ?{param_idx}"));
        params_vec.push(Box::new(created_by.to_string()));
        param_idx += 1;
    }

    if let Some(pharmacy_email) = &filter.pharmacy_email {
        sql.push_str(&format!(" AND pharmacy_email = ?{param_idx}"));
        params_vec.push(Box::new(pharmacy_email.clone()));
        param_idx += 1;
    }

    if let Some(patient_email) = &filter.patient_email {
        sql.push_str(&format!(" AND patient_email = ?{param_idx}"));
        params_vec.push(Box::new(patient_email.clone()));
        param_idx += 1;
    }

    if let Some(pharmacy_email) = &filter.visible_to_pharmacy {
        sql.push_str(&format!(
            " AND (pharmacy_email = ?{param_idx} OR pharmacy_email IS NULL OR pharmacy_email = '')"
        ));
        params_vec.push(Box::new(pharmacy_email.clone()));
        param_idx += 1;
    }

    if let Some(is_dispensed) = filter.is_dispensed {
        sql.push_str(&format!(" AND is_dispensed = ?{param_idx}"));
        params_vec.push(Box::new(is_dispensed as i32));
    }

    sql.push_str(" ORDER BY created_at ASC, rowid ASC");

    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();

    // One snapshot for the rows and every log read after them.
    let tx = conn.unchecked_transaction()?;
    let rows = tx
        .prepare(&sql)?
        .query_map(params_refs.as_slice(), prescription_row_from_rusqlite)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut prescriptions = Vec::with_capacity(rows.len());
    for row in rows {
        let id = parse_uuid("prescriptions.id", &row.id)?;
        let log = get_dispense_log(&tx, &id)?;
        prescriptions.push(prescription_from_row(row, log)?);
    }
    tx.commit()?;
    Ok(prescriptions)
}

/// Write the whole aggregate back. Fails with `Conflict` when the stored
/// revision moved on since `rx` was loaded; nothing is written in that case.
pub fn save_prescription(conn: &Connection, rx: &mut Prescription) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    let d = &rx.details;
    let updated = tx.execute(
        "UPDATE prescriptions SET prescription_date = ?1, medication_name = ?2,
         medication_strength = ?3, medication_form = ?4, direction_of_use = ?5,
         quantity = ?6, repeats = ?7, is_dispensed = ?8, patient_name = ?9,
         patient_email = ?10, pharmacy_email = ?11, updated_at = ?12,
         revision = revision + 1
         WHERE id = ?13 AND revision = ?14",
        params![
            d.prescription_date.to_string(),
            d.medication_name,
            d.medication_strength,
            d.medication_form,
            d.direction_of_use,
            d.quantity,
            d.repeats,
            rx.is_dispensed() as i32,
            d.patient_name,
            d.patient_email,
            d.pharmacy_email,
            rx.updated_at.to_rfc3339(),
            rx.id.to_string(),
            rx.revision(),
        ],
    )
    .map_err(DatabaseError::from_write)?;

    if updated == 0 {
        let exists: Option<i64> = tx
            .query_row(
                "SELECT revision FROM prescriptions WHERE id = ?1",
                params![rx.id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        return Err(match exists {
            Some(_) => DatabaseError::Conflict {
                entity_type: ENTITY.into(),
                id: rx.id.to_string(),
                expected: rx.revision(),
            },
            None => DatabaseError::NotFound {
                entity_type: ENTITY.into(),
                id: rx.id.to_string(),
            },
        });
    }

    tx.execute(
        "DELETE FROM dispense_log WHERE prescription_id = ?1",
        params![rx.id.to_string()],
    )?;
    insert_log_entries(&tx, &rx.id, rx.dispense_log())?;
    tx.commit()?;

    rx.mark_saved();
    Ok(())
}

/// Permanently remove a prescription and its log. Returns false if no row matched.
pub fn delete_prescription(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM prescriptions WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(deleted > 0)
}

pub fn get_dispense_log(
    conn: &Connection,
    prescription_id: &Uuid,
) -> Result<Vec<DispenseLogEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, dispensed_by, dispensed_by_name, dispensed_date, quantity_dispensed, status
         FROM dispense_log WHERE prescription_id = ?1 ORDER BY position ASC",
    )?;

    let rows = stmt.query_map(params![prescription_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, dispensed_by, dispensed_by_name, dispensed_date, quantity_dispensed, status) = row?;
        entries.push(DispenseLogEntry {
            id: parse_uuid("dispense_log.id", &id)?,
            dispensed_by: parse_uuid("dispense_log.dispensed_by", &dispensed_by)?,
            dispensed_by_name,
            dispensed_date: parse_timestamp("dispense_log.dispensed_date", &dispensed_date)?,
            quantity_dispensed,
            status: DispenseStatus::from_str(&status)?,
        });
    }
    Ok(entries)
}

fn insert_log_entries(
    conn: &Connection,
    prescription_id: &Uuid,
    entries: &[DispenseLogEntry],
) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO dispense_log (id, prescription_id, position, dispensed_by,
         dispensed_by_name, dispensed_date, quantity_dispensed, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for (position, entry) in entries.iter().enumerate() {
        stmt.execute(params![
            entry.id.to_string(),
            prescription_id.to_string(),
            position as i64,
            entry.dispensed_by.to_string(),
            entry.dispensed_by_name,
            entry.dispensed_date.to_rfc3339(),
            entry.quantity_dispensed,
            entry.status.as_str(),
        ])?;
    }
    Ok(())
}

const SELECT_PRESCRIPTION: &str =
    "SELECT id, created_by, prescription_date, medication_name, medication_strength,
     medication_form, direction_of_use, quantity, repeats, is_dispensed, patient_name,
     patient_email, pharmacy_email, revision, created_at, updated_at
     FROM prescriptions";

struct PrescriptionRow {
    id: String,
    created_by: String,
    prescription_date: String,
    medication_name: String,
    medication_strength: String,
    medication_form: String,
    direction_of_use: String,
    quantity: i64,
    repeats: i64,
    is_dispensed: i32,
    patient_name: String,
    patient_email: String,
    pharmacy_email: Option<String>,
    revision: i64,
    created_at: String,
    updated_at: String,
}

fn prescription_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<PrescriptionRow, rusqlite::Error> {
    Ok(PrescriptionRow {
        id: row.get(0)?,
        created_by: row.get(1)?,
        prescription_date: row.get(2)?,
        medication_name: row.get(3)?,
        medication_strength: row.get(4)?,
        medication_form: row.get(5)?,
        direction_of_use: row.get(6)?,
        quantity: row.get(7)?,
        repeats: row.get(8)?,
        is_dispensed: row.get(9)?,
        patient_name: row.get(10)?,
        patient_email: row.get(11)?,
        pharmacy_email: row.get(12)?,
        revision: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn prescription_from_row(
    row: PrescriptionRow,
    dispense_log: Vec<DispenseLogEntry>,
) -> Result<Prescription, DatabaseError> {
    let prescription_date = NaiveDate::parse_from_str(&row.prescription_date, "%Y-%m-%d")
        .map_err(|_| DatabaseError::InvalidValue {
            field: "prescriptions.prescription_date".into(),
            value: row.prescription_date.clone(),
        })?;

    Ok(Prescription::restore(
        parse_uuid("prescriptions.id", &row.id)?,
        parse_uuid("prescriptions.created_by", &row.created_by)?,
        PrescriptionDetails {
            prescription_date,
            medication_name: row.medication_name,
            medication_strength: row.medication_strength,
            medication_form: row.medication_form,
            direction_of_use: row.direction_of_use,
            quantity: row.quantity,
            repeats: row.repeats,
            patient_name: row.patient_name,
            patient_email: row.patient_email,
            pharmacy_email: row.pharmacy_email.filter(|e| !e.is_empty()),
        },
        row.is_dispensed != 0,
        dispense_log,
        row.revision,
        parse_timestamp("prescriptions.created_at", &row.created_at)?,
        parse_timestamp("prescriptions.updated_at", &row.updated_at)?,
    ))
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|_| DatabaseError::InvalidValue {
        field: field.into(),
        value: value.into(),
    })
}

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| DatabaseError::InvalidValue {
            field: field.into(),
            value: value.into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::Role;
    use crate::models::{Actor, NewDispense, PrescriptionPatch};

    fn details(pharmacy: Option<&str>, patient: &str) -> PrescriptionDetails {
        PrescriptionDetails {
            prescription_date: NaiveDate::from_ymd_opt(2025, 8, 12).unwrap(),
            medication_name: "Amoxicillin".into(),
            medication_strength: "500mg".into(),
            medication_form: "Capsule".into(),
            direction_of_use: "Take ONE capsule THREE times a day".into(),
            quantity: 30,
            repeats: 1,
            patient_name: "John Doe".into(),
            patient_email: patient.into(),
            pharmacy_email: pharmacy.map(String::from),
        }
    }

    fn pharmacy_actor() -> Actor {
        Actor {
            id: Uuid::new_v4(),
            role: Role::Pharmacy,
            email: "rx@x.com".into(),
            name: "Corner Pharmacy".into(),
        }
    }

    fn stored(conn: &Connection, doctor: Uuid, pharmacy: Option<&str>, patient: &str) -> Prescription {
        let rx = Prescription::new(doctor, details(pharmacy, patient), Utc::now());
        insert_prescription(conn, &rx).unwrap();
        rx
    }

    #[test]
    fn insert_and_get_round_trip() {
        let conn = open_memory_database().unwrap();
        let rx = stored(&conn, Uuid::new_v4(), Some("rx@x.com"), "p@x.com");

        let loaded = get_prescription(&conn, &rx.id).unwrap().unwrap();
        assert_eq!(loaded.details, rx.details);
        assert_eq!(loaded.created_by_user_id, rx.created_by_user_id);
        assert!(!loaded.is_dispensed());
        assert!(loaded.dispense_log().is_empty());
    }

    #[test]
    fn aggregate_reads_close_their_transaction() {
        let conn = open_memory_database().unwrap();
        let rx = stored(&conn, Uuid::new_v4(), None, "p@x.com");
        let mut loaded = get_prescription(&conn, &rx.id).unwrap().unwrap();
        loaded.append_dispense_entry(&pharmacy_actor(), NewDispense::default(), Utc::now());
        save_prescription(&conn, &mut loaded).unwrap();

        assert!(conn.is_autocommit());
        assert_eq!(get_prescription(&conn, &rx.id).unwrap().unwrap().dispense_log().len(), 1);
        assert!(get_prescription(&conn, &Uuid::new_v4()).unwrap().is_none());
        assert!(conn.is_autocommit());

        let listed = list_prescriptions(&conn, &PrescriptionFilter::default()).unwrap();
        assert_eq!(listed[0].dispense_log().len(), 1);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn get_missing_returns_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_prescription(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn save_persists_log_in_order_and_bumps_revision() {
        let conn = open_memory_database().unwrap();
        let rx = stored(&conn, Uuid::new_v4(), Some("rx@x.com"), "p@x.com");
        let actor = pharmacy_actor();

        let mut loaded = get_prescription(&conn, &rx.id).unwrap().unwrap();
        loaded.append_dispense_entry(
            &actor,
            NewDispense {
                quantity_dispensed: Some(10),
                status: Some(DispenseStatus::Pending),
            },
            Utc::now(),
        );
        loaded.append_dispense_entry(&actor, NewDispense::default(), Utc::now());
        save_prescription(&conn, &mut loaded).unwrap();
        assert_eq!(loaded.revision(), 1);

        let reloaded = get_prescription(&conn, &rx.id).unwrap().unwrap();
        assert_eq!(reloaded.revision(), 1);
        assert!(reloaded.is_dispensed());
        let log = reloaded.dispense_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].quantity_dispensed, 10);
        assert_eq!(log[0].status, DispenseStatus::Pending);
        assert_eq!(log[1].quantity_dispensed, 30);
        assert_eq!(log[1].dispensed_by, actor.id);
    }

    #[test]
    fn stale_save_conflicts_and_writes_nothing() {
        let conn = open_memory_database().unwrap();
        let rx = stored(&conn, Uuid::new_v4(), Some("rx@x.com"), "p@x.com");

        let mut first = get_prescription(&conn, &rx.id).unwrap().unwrap();
        let mut second = get_prescription(&conn, &rx.id).unwrap().unwrap();

        first.apply_patch(
            PrescriptionPatch {
                medication_name: Some("Ibuprofen".into()),
                ..Default::default()
            },
            Utc::now(),
        );
        save_prescription(&conn, &mut first).unwrap();

        second.append_dispense_entry(&pharmacy_actor(), NewDispense::default(), Utc::now());
        let err = save_prescription(&conn, &mut second).unwrap_err();
        assert!(matches!(err, DatabaseError::Conflict { expected: 0, .. }));

        let current = get_prescription(&conn, &rx.id).unwrap().unwrap();
        assert_eq!(current.details.medication_name, "Ibuprofen");
        assert!(current.dispense_log().is_empty());
        assert!(!current.is_dispensed());
    }

    #[test]
    fn save_after_delete_is_not_found() {
        let conn = open_memory_database().unwrap();
        let rx = stored(&conn, Uuid::new_v4(), None, "p@x.com");
        let mut loaded = get_prescription(&conn, &rx.id).unwrap().unwrap();
        assert!(delete_prescription(&conn, &rx.id).unwrap());

        let err = save_prescription(&conn, &mut loaded).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn delete_cascades_dispense_log() {
        let conn = open_memory_database().unwrap();
        let rx = stored(&conn, Uuid::new_v4(), None, "p@x.com");
        let mut loaded = get_prescription(&conn, &rx.id).unwrap().unwrap();
        loaded.append_dispense_entry(&pharmacy_actor(), NewDispense::default(), Utc::now());
        save_prescription(&conn, &mut loaded).unwrap();

        assert!(delete_prescription(&conn, &rx.id).unwrap());
        assert!(!delete_prescription(&conn, &rx.id).unwrap());
        let orphans: i64 = conn
            .query_row("SELECT COUNT(*) FROM dispense_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn filters_by_creator() {
        let conn = open_memory_database().unwrap();
        let doctor = Uuid::new_v4();
        stored(&conn, doctor, None, "a@x.com");
        stored(&conn, doctor, None, "b@x.com");
        stored(&conn, Uuid::new_v4(), None, "c@x.com");

        let own = list_prescriptions(
            &conn,
            &PrescriptionFilter {
                created_by: Some(doctor),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(own.len(), 2);
        assert!(own.iter().all(|rx| rx.created_by_user_id == doctor));
    }

    #[test]
    fn visible_to_pharmacy_includes_unassigned_only_besides_own() {
        let conn = open_memory_database().unwrap();
        let doctor = Uuid::new_v4();
        let mine = stored(&conn, doctor, Some("a@rx.com"), "p@x.com");
        let theirs = stored(&conn, doctor, Some("b@rx.com"), "p@x.com");
        let open = stored(&conn, doctor, None, "p@x.com");
        stored(&conn, doctor, None, "other@x.com");

        let found = list_prescriptions(
            &conn,
            &PrescriptionFilter {
                patient_email: Some("p@x.com".into()),
                visible_to_pharmacy: Some("a@rx.com".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let ids: Vec<Uuid> = found.iter().map(|rx| rx.id).collect();
        assert!(ids.contains(&mine.id));
        assert!(ids.contains(&open.id));
        assert!(!ids.contains(&theirs.id));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn filters_by_dispensed_flag() {
        let conn = open_memory_database().unwrap();
        let rx = stored(&conn, Uuid::new_v4(), Some("rx@x.com"), "p@x.com");
        stored(&conn, Uuid::new_v4(), Some("rx@x.com"), "p@x.com");

        let mut loaded = get_prescription(&conn, &rx.id).unwrap().unwrap();
        loaded.append_dispense_entry(&pharmacy_actor(), NewDispense::default(), Utc::now());
        save_prescription(&conn, &mut loaded).unwrap();

        let done = list_prescriptions(
            &conn,
            &PrescriptionFilter {
                pharmacy_email: Some("rx@x.com".into()),
                is_dispensed: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, rx.id);
        assert_eq!(done[0].dispense_log().len(), 1);

        let pending = list_prescriptions(
            &conn,
            &PrescriptionFilter {
                is_dispensed: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(pending.len(), 1);
        assert_ne!(pending[0].id, rx.id);
    }

    #[test]
    fn check_constraint_surfaces_as_constraint_violation() {
        let conn = open_memory_database().unwrap();
        let mut bad = details(None, "p@x.com");
        bad.quantity = 0;
        let rx = Prescription::new(Uuid::new_v4(), bad, Utc::now());

        let err = insert_prescription(&conn, &rx).unwrap_err();
        assert!(matches!(err, DatabaseError::ConstraintViolation(_)));
        assert!(get_prescription(&conn, &rx.id).unwrap().is_none());
    }
}
