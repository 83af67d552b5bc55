//! Error types for the search engine and its oracles.

use std::fmt;
use std::io;
use std::time::Duration;

use crate::schema::ConfigError;

/// Failure of a single oracle call.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle failed: {0}")]
    Failed(String),
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),
    #[error("oracle returned invalid output: {0}")]
    InvalidOutput(String),
    #[error("oracle I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Which oracle a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleKind {
    Mutation,
    Fitness,
}

impl fmt::Display for OracleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleKind::Mutation => write!(f, "mutation"),
            OracleKind::Fitness => write!(f, "fitness"),
        }
    }
}

/// Errors raised by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("{oracle} oracle failed in generation {generation} on island {island_id}: {source}")]
    Oracle {
        generation: usize,
        island_id: usize,
        oracle: OracleKind,
        #[source]
        source: OracleError,
    },
    #[error("Unknown bandit arm: {0}")]
    UnknownArm(String),
    #[error("Engine used before initialization")]
    NotInitialized,
    #[error("Shared state lock poisoned")]
    LockPoisoned,
    #[error("Could not build worker pool: {0}")]
    WorkerPool(String),
}

impl EngineError {
    /// Oracle that caused this error, if any.
    pub fn oracle_kind(&self) -> Option<OracleKind> {
        match self {
            EngineError::Oracle { oracle, .. } => Some(*oracle),
            _ => None,
        }
    }
}
