use thiserror::Error;

/// Enum with all errors in this crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Coordinate-length mismatch or empty input.
    #[error("Shape error: {0}")]
    Shape(String),

    /// Invalid structural parameter or k relative to the dataset size.
    #[error("Parameter error: {0}")]
    Parameter(String),

    /// Point identifier past the end of the point set.
    #[error("Index error: {index} is out of range for {len} points")]
    OutOfRange { index: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
