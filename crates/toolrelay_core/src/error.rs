//! Core error types for TOOLRELAY.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Invalid encoding
    InvalidEncoding {
        /// Decoder message
        reason: String,
    },

    /// Invalid ID format
    InvalidId {
        /// Why the id was rejected
        reason: String,
    },

    /// Content could not be decoded as the requested type
    Decode {
        /// Requested type
        expected: &'static str,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEncoding { reason } => write!(f, "Invalid encoding: {}", reason),
            Self::InvalidId { reason } => write!(f, "Invalid ID: {}", reason),
            Self::Decode { expected } => write!(f, "Content is not a {}", expected),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidEncoding {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::Decode { expected: "string" };
        assert_eq!(format!("{}", err), "Content is not a string");

        let err = CoreError::InvalidId {
            reason: "too short".to_string(),
        };
        assert_eq!(format!("{}", err), "Invalid ID: too short");
    }

    #[test]
    fn test_from_serde_json() {
        let err: CoreError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, CoreError::InvalidEncoding { .. }));
    }

    #[test]
    fn test_error_equality() {
        let err1 = CoreError::Decode { expected: "bool" };
        let err2 = CoreError::Decode { expected: "bool" };
        assert_eq!(err1, err2);
        assert_ne!(err1, CoreError::Decode { expected: "i64" });
    }
}
