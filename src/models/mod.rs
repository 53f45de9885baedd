pub mod account;
pub mod enums;
pub mod fields;
pub mod prescription;

pub use account::*;
pub use prescription::*;
