use thiserror::Error;

/// Crate-wide error type. Merge failures are fatal to the data set they
/// belong to; everything else is surfaced to the caller and logged.
#[derive(Debug, Error)]
pub enum UsherError {
    #[error("structure and content files don't match: {0}")]
    Mismatch(String),

    #[error("malformed tour document: {0}")]
    Document(String),

    #[error("data error: {0}")]
    Data(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway error: {0}")]
    Gateway(String),
}
