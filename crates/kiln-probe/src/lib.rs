pub mod cuesheet;
pub mod error;
pub mod fingerprint;
pub mod probe;
pub mod transcode;

pub use error::ProbeError;
pub use fingerprint::{Fingerprint, FingerprintTool};
pub use probe::{ProbeOutput, Prober};
pub use transcode::{LogLevel, Transcoder, TranscodeRequest};
