//! Error kinds, per spec §7.
//!
//! `ReplayTimeout` and `CausalityViolation` are deliberately absent: both are
//! non-fatal per the propagation policy in §7 and are recorded into
//! [`crate::stats::RuntimeStats`] / [`crate::scheduler::EventSchedulerStats`]
//! instead of being raised.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("trace corrupt: {0}")]
    TraceCorrupt(String),

    #[error("unable to reproduce correctness violation after {runs} run(s)")]
    NotReproducible { runs: u32 },

    #[error("resource error: {0}")]
    Resource(String),

    #[error("shutdown requested")]
    ShutdownRequested,

    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed trace record: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Exit code per spec §6: 0 success (not an error), 5 for
    /// `NotReproducible`, nonzero otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::NotReproducible { .. } => 5,
            _ => 1,
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> EngineError {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
