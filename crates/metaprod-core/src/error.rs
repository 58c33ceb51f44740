//! Error types for the pipeline core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors surfaced by the store, executor, and pipeline steps
///
/// Step-level problems that should count against an item's retry budget are
/// not errors; they are reported as failed step outcomes. Values of this type
/// either stop the scheduler (configuration, database) or are converted into
/// a failed outcome by the step that raised them (catalog, report parsing).
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Missing tool, toolchain entry, project settings or reference catalog
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{entity} '{key}' not found")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} '{key}' already exists")]
    Duplicate { entity: &'static str, key: String },

    /// Accession observed in results but absent from the reference catalog
    #[error("Accession '{0}' is not in the reference catalog")]
    UnknownAccession(String),

    #[error("IO error at {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed report: {0}")]
    Report(#[from] csv::Error),

    #[error("Search archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid settings: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Common(#[from] metaprod_common::MetaprodError),
}

impl PipelineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn duplicate(entity: &'static str, key: impl ToString) -> Self {
        Self::Duplicate {
            entity,
            key: key.to_string(),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Attach a path to an IO error.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    /// Configuration failures stop the scheduler without consuming retries.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Errors that belong to the item's data rather than to the environment.
    pub fn is_item_fault(&self) -> bool {
        matches!(
            self,
            Self::UnknownAccession(_) | Self::Report(_) | Self::Archive(_) | Self::Parse(_) | Self::File { .. }
        )
    }
}
