use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub clinic: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Authenticated caller identity. Attached to every protected request
/// before any service operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    pub email: String,
    pub name: String,
}

impl From<&Account> for Actor {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            role: account.role,
            email: account.email.clone(),
            name: account.name.clone(),
        }
    }
}

/// Prescribing doctor as shown to pharmacies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrescriberSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub clinic: Option<String>,
}
