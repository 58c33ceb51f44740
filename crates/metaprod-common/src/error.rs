//! Error types shared across MetaProD crates

use thiserror::Error;

/// Result type alias for shared helpers
pub type Result<T> = std::result::Result<T, MetaprodError>;

/// Errors raised by shared helpers and lightweight parsing
#[derive(Error, Debug)]
pub enum MetaprodError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid {kind}: '{value}'")]
    InvalidValue { kind: &'static str, value: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl MetaprodError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Error for a textual value that does not name a known variant.
    pub fn invalid(kind: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            kind,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_message() {
        let err = MetaprodError::invalid("status", "BOGUS");
        assert_eq!(err.to_string(), "Invalid status: 'BOGUS'");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: MetaprodError = io.into();
        assert!(matches!(err, MetaprodError::Io(_)));
    }
}
