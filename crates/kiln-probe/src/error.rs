use std::process::ExitStatus;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr_tail}")]
    NonZeroExit {
        tool: &'static str,
        status: ExitStatus,
        stderr_tail: String,
    },

    #[error("malformed {tool} output: {0}")]
    Malformed(&'static str, String),

    #[error("no audio stream present")]
    NoAudioStream,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cue sheet error: {0}")]
    CueSheet(String),
}
