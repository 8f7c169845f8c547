//! Error types for calibration fitting and evaluation
//!
//! Errors are raised where they are detected, before any output is written.

/// Errors raised while fitting or evaluating calibration models.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Paired sequences differ in length, an array has the wrong shape, or an input cannot be
    /// interpreted.
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// Configuration is missing or invalid for the requested operation.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A sequence which must be monotonic is not.
    #[error("ordering violated: {0}")]
    Order(String),

    /// The least-squares system is underdetermined or rank deficient.
    #[error("numerical failure: {0}")]
    Numerical(String),

    #[error(transparent)]
    Linalg(#[from] ndarray_linalg::error::LinalgError),

    #[error(transparent)]
    Reshape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    TomlSerialize(#[from] toml::ser::Error),

    #[error(transparent)]
    TomlDeserialize(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn shape(context: &str, expected: usize, found: usize) -> Self {
        Self::Shape(format!("{context} expected length {expected}, found {found}"))
    }
}

/// Fail with [`Error::Shape`] unless two paired sequences have the same length.
pub(crate) fn ensure_same_length(
    context: &'static str,
    expected: usize,
    found: usize,
) -> crate::Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::shape(context, expected, found))
    }
}
