//! HTTP API.
//!
//! Routes are nested under `/api/`. Protected routes pass through
//! Auth → Audit before reaching a handler; `/api/health` is open.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_api_server, ApiServer, ApiSession};
pub use types::ApiContext;
