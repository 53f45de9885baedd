pub mod access;
pub mod api;
pub mod config;
pub mod core_state;
pub mod db;
pub mod dispensing; // Pharmacy listings + dispense log
pub mod error;
pub mod models;
pub mod prescriptions; // Doctor CRUD

use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::api::types::hash_token;
use crate::config::{SeedAccount, ServerConfig};
use crate::models::Account;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Database(#[from] db::DatabaseError),
    #[error("Cannot create data directory {path}: {source}")]
    DataDir {
        path: String,
        source: std::io::Error,
    },
    #[error("{0}")]
    Server(String),
}

/// Start the service and serve until Ctrl-C.
pub async fn run() -> Result<(), RunError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = ServerConfig::from_env()?;
    if let Some(dir) = config.db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| RunError::DataDir {
            path: dir.display().to_string(),
            source,
        })?;
    }

    {
        let conn = db::open_database(&config.db_path)?;
        if let Some(path) = &config.accounts_file {
            let accounts = config::load_seed_accounts(path)?;
            let count = provision_accounts(&conn, &accounts)?;
            tracing::info!(count, path = %path.display(), "Accounts provisioned");
        }
    }

    let core = Arc::new(core_state::CoreState::new(config.db_path.clone()));
    let mut server = api::start_api_server(
        core,
        config.bind_addr,
        config.allowed_origin.as_deref(),
    )
    .await
    .map_err(RunError::Server)?;

    tracing::info!(addr = %server.session.server_addr, db = %config.db_path.display(), "Ready");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Cannot listen for Ctrl-C: {e}");
    }
    server.shutdown();
    server.stopped().await;
    Ok(())
}

/// Upsert seed accounts and register their bearer tokens (stored hashed).
pub fn provision_accounts(
    conn: &Connection,
    accounts: &[SeedAccount],
) -> Result<usize, db::DatabaseError> {
    for seed in accounts {
        let id = db::upsert_account(
            conn,
            &Account {
                id: Uuid::new_v4(),
                name: seed.name.clone(),
                email: seed.email.clone(),
                role: seed.role,
                clinic: seed.clinic.clone(),
                created_at: Utc::now(),
            },
        )?;
        db::insert_token_hash(conn, &id, &hash_token(&seed.token))?;
    }
    Ok(accounts.len())
}
