//! Error types for the trainer.

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A vector's length does not match the width the network expects at that point.
    #[error("{context}: expected length {expected}, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    /// Training or evaluation was asked to run over zero patterns.
    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    #[error("Dataset mismatch: {images} images but {labels} labels")]
    DatasetMismatch { images: usize, labels: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn check_len(context: &'static str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                context,
                expected,
                actual,
            })
        }
    }
}
