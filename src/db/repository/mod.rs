//! Repository layer: entity-scoped database operations.
//!
//! All public functions are re-exported here.

mod account;
mod prescription;

pub use account::*;
pub use prescription::*;
