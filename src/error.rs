use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Run-level failures. Only `InputNotFound` and `MalformedArguments` stop a run;
/// `FetchFailed` describes an isolated per-identifier failure.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("input file not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("malformed arguments: {0}")]
    MalformedArguments(String),

    #[error("fetch failed for {id}: {source}")]
    FetchFailed {
        id: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to render output: {}", .0.join("; "))]
    Render(Vec<String>),
}

/// Why a single document could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("task ended without reporting a result")]
    Aborted,
}

impl FetchError {
    /// Timeouts, transport errors, 429 and 5xx are worth another attempt.
    /// Everything else (404 and friends) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout(_) | FetchError::Transport(_) => true,
            FetchError::Status(code) => *code == 429 || (500..600).contains(code),
            FetchError::Aborted => false,
        }
    }
}
