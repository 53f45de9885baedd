//! Accounts and bearer-token lookup backing request authentication.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::Role;
use crate::models::{Account, Actor, PrescriberSummary};

/// Insert an account, or refresh name/role/clinic when the email is already
/// registered. Returns the stored account id.
pub fn upsert_account(conn: &Connection, account: &Account) -> Result<Uuid, DatabaseError> {
    conn.execute(
        "INSERT INTO accounts (id, name, email, role, clinic, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(email) DO UPDATE SET
             name = excluded.name, role = excluded.role, clinic = excluded.clinic",
        params![
            account.id.to_string(),
            account.name,
            account.email,
            account.role.as_str(),
            account.clinic,
            account.created_at.to_rfc3339(),
        ],
    )?;

    let id: String = conn.query_row(
        "SELECT id FROM accounts WHERE email = ?1",
        params![account.email],
        |row| row.get(0),
    )?;
    parse_account_id(&id)
}

#[cfg(test)]
pub(crate) fn get_account(conn: &Connection, id: &Uuid) -> Result<Option<Account>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, name, email, role, clinic, created_at FROM accounts WHERE id = ?1",
            params![id.to_string()],
            account_row_from_rusqlite,
        )
        .optional()?;
    row.map(account_from_row).transpose()
}

/// Store the hash of a bearer token for an account.
pub fn insert_token_hash(
    conn: &Connection,
    account_id: &Uuid,
    token_hash: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR REPLACE INTO access_tokens (token_hash, account_id, created_at)
         VALUES (?1, ?2, ?3)",
        params![token_hash, account_id.to_string(), Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Resolve a token hash to the acting account.
pub fn find_actor_by_token_hash(
    conn: &Connection,
    token_hash: &str,
) -> Result<Option<Actor>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT a.id, a.name, a.email, a.role, a.clinic, a.created_at
             FROM access_tokens t JOIN accounts a ON a.id = t.account_id
             WHERE t.token_hash = ?1",
            params![token_hash],
            account_row_from_rusqlite,
        )
        .optional()?;
    Ok(row.map(account_from_row).transpose()?.map(|a| Actor::from(&a)))
}

/// Prescriber summaries keyed by account id. Unknown ids are skipped.
pub fn get_prescriber_summaries(
    conn: &Connection,
    ids: &[Uuid],
) -> Result<HashMap<Uuid, PrescriberSummary>, DatabaseError> {
    let mut summaries = HashMap::new();
    let mut stmt = conn.prepare("SELECT name, email, clinic FROM accounts WHERE id = ?1")?;
    for id in ids {
        if summaries.contains_key(id) {
            continue;
        }
        let found = stmt
            .query_row(params![id.to_string()], |row| {
                Ok(PrescriberSummary {
                    id: *id,
                    name: row.get(0)?,
                    email: row.get(1)?,
                    clinic: row.get(2)?,
                })
            })
            .optional()?;
        if let Some(summary) = found {
            summaries.insert(*id, summary);
        }
    }
    Ok(summaries)
}

type AccountRow = (String, String, String, String, Option<String>, String);

fn account_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<AccountRow, rusqlite::Error> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn account_from_row(row: AccountRow) -> Result<Account, DatabaseError> {
    let (id, name, email, role, clinic, created_at) = row;
    Ok(Account {
        id: parse_account_id(&id)?,
        name,
        email,
        role: Role::from_str(&role)?,
        clinic,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| DatabaseError::InvalidValue {
                field: "accounts.created_at".into(),
                value: created_at.clone(),
            })?,
    })
}

fn parse_account_id(id: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(id).map_err(|_| DatabaseError::InvalidValue {
        field: "accounts.id".into(),
        value: id.into(),
    })
}
