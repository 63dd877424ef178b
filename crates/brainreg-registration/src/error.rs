//! Error types for registration operations.

use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Volume cannot be parsed or is not 3-D.
    #[error("Format error: {0}")]
    Format(String),

    /// Volume has zero (or non-finite) intensity variance.
    #[error("Degenerate volume: {0}")]
    DegenerateVolume(String),

    /// Shapes cannot be reconciled.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Writing output or creating a directory failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create a format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create a degenerate volume error.
    pub fn degenerate_volume(msg: impl Into<String>) -> Self {
        Self::DegenerateVolume(msg.into())
    }

    /// Create an I/O error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a shape mismatch error.
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = RegistrationError::degenerate_volume("constant image");
        assert!(matches!(err, RegistrationError::DegenerateVolume(_)));
    }

    #[test]
    fn test_error_display() {
        let err = RegistrationError::format("not a NIfTI file");
        assert_eq!(err.to_string(), "Format error: not a NIfTI file");
    }

    #[test]
    fn test_shape_mismatch() {
        let err = RegistrationError::shape_mismatch(&[10, 10, 10], &[0, 5, 5]);
        let err_str = err.to_string();
        assert!(err_str.contains("expected [10, 10, 10]"));
        assert!(err_str.contains("got [0, 5, 5]"));
    }
}
