use thiserror::Error;

/// Failures at the edges of the engine. Verification runs themselves never fail.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("malformed document: {0}")]
    MalformedDocument(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("fix assistant failed: {0}")]
    Assistant(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
