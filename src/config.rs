use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::models::enums::Role;

/// Application-level constants
pub const APP_NAME: &str = "erx";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5001";
const DB_FILE_NAME: &str = "erx.db";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "erx_lib=info,erx=info,tower_http=warn"
}

/// Get the application data directory: `<user data dir>/erx`, falling back
/// to the home directory where no data dir is defined.
pub fn app_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .map(|base| base.join(APP_NAME))
        .ok_or(ConfigError::NoDataDir)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot determine a data directory; set ERX_DB_PATH")]
    NoDataDir,
    #[error("Invalid ERX_BIND_ADDR '{value}': {reason}")]
    InvalidBindAddr { value: String, reason: String },
    #[error("Cannot read accounts file {path}: {reason}")]
    SeedFile { path: String, reason: String },
}

/// Runtime settings, resolved from `ERX_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub accounts_file: Option<PathBuf>,
    pub allowed_origin: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through `lookup`. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let raw_addr = get("ERX_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidBindAddr {
                value: raw_addr.clone(),
                reason: e.to_string(),
            })?;

        let db_path = match get("ERX_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => app_data_dir()?.join(DB_FILE_NAME),
        };

        Ok(Self {
            bind_addr,
            db_path,
            accounts_file: get("ERX_ACCOUNTS_FILE").map(PathBuf::from),
            allowed_origin: get("ERX_ALLOWED_ORIGIN"),
        })
    }
}

/// One entry of the accounts seed file. The raw token is only held in
/// memory long enough to hash it.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedAccount {
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub clinic: Option<String>,
    pub token: String,
}

pub fn load_seed_accounts(path: &Path) -> Result<Vec<SeedAccount>, ConfigError> {
    let seed_error = |reason: String| ConfigError::SeedFile {
        path: path.display().to_string(),
        reason,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| seed_error(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| seed_error(e.to_string()))
}
