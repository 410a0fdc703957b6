use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the crate can report.
///
/// `Configuration` and `ShapeMismatch` are raised before any training step
/// runs; `Compute` aborts the current run and is never retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("compute error: {0}")]
    Compute(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("invalid state: expected {expected}, found {found}")]
    InvalidState {
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        Error::ShapeMismatch(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    pub fn compute(msg: impl Into<String>) -> Self {
        Error::Compute(msg.into())
    }
}
