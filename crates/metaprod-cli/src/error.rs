//! Error types for the MetaProD CLI
//!
//! Messages are shown to operators, so each variant carries a hint on what
//! to do next.

use metaprod_core::PipelineError;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug)]
pub enum CliError {
    /// Missing tool, toolchain entry, settings or catalog
    #[error("{0}. Check the toolchain file, the project settings and 'metaprod catalog'.")]
    Configuration(String),

    #[error("{0}. Use 'metaprod project show' or 'metaprod inspect' to list what exists.")]
    NotFound(String),

    #[error("{0}. Choose another name or use the existing one.")]
    Duplicate(String),

    #[error("Database error: {0}. Check METAPROD_DATABASE_URL and that the file is writable.")]
    Database(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Pipeline(PipelineError),

    #[error("Failed to format JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic anyhow error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<PipelineError> for CliError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Configuration(msg) => Self::Configuration(msg),
            e @ PipelineError::NotFound { .. } => Self::NotFound(e.to_string()),
            e @ PipelineError::Duplicate { .. } => Self::Duplicate(e.to_string()),
            e @ (PipelineError::Database(_) | PipelineError::Migration(_)) => {
                Self::Database(e.to_string())
            },
            other => Self::Pipeline(other),
        }
    }
}

impl CliError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}
