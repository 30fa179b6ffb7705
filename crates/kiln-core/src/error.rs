use std::path::PathBuf;

use thiserror::Error;

/// The six error kinds named by the specification.
#[derive(Debug, Error)]
pub enum KilnError {
    #[error("{path}: input rejected: {reason}")]
    InputRejected { path: PathBuf, reason: String },

    #[error("{path}: probe failed: {source}")]
    ProbeFailure {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("{path}: script failed: {source}")]
    ScriptFailure {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("resolver failure: {source}")]
    ResolverFailure {
        #[source]
        source: anyhow::Error,
    },

    #[error("{path}: materialization failed: {source}")]
    MaterializationFailure {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("fatal: {0}")]
    Fatal(#[source] anyhow::Error),
}

impl KilnError {
    pub fn input_rejected(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        KilnError::InputRejected {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is fatal to the whole process, as opposed to diverting a
    /// single record to the log channel (per-record errors do not change exit code).
    pub fn is_fatal(&self) -> bool {
        matches!(self, KilnError::Fatal(_))
    }
}
