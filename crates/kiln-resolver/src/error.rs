use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("catalogue request failed: {0}")]
    Catalogue(#[from] reqwest::Error),

    #[error("malformed catalogue response: {0}")]
    MalformedResponse(String),

    #[error("fingerprint lookup failed: {0}")]
    Fingerprint(#[from] kiln_probe::ProbeError),

    #[error("no acceptable match found")]
    NoMatch,
}
