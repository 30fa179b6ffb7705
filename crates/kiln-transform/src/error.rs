use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("transcode failed: {0}")]
    Transcode(#[from] kiln_probe::ProbeError),

    #[error("tag write failed: {0}")]
    TagWrite(#[from] lofty::error::LoftyError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
