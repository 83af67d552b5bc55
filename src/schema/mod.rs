//! Schema module - Configuration and record types for the evolutionary search.

mod config;
mod evolution;

pub use config::*;
pub use evolution::*;
