//! Error types for the relation migrator

use std::path::PathBuf;

use thiserror::Error;

/// Result type for migration operations
pub type Result<T> = std::result::Result<T, MigrationError>;

/// Migration errors
///
/// `SchemaViolation` is local to one document: callers record it and move on.
/// Everything else stops the run.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Schema violation in {record}: {reason}")]
    SchemaViolation { record: String, reason: String },

    #[error("Schema violation in {record}: ReferenceTable {table} has no AxEdtTableReference")]
    MissingTableReference { record: String, table: String },

    #[error("Failed to read {}: {source}", path.display())]
    Document {
        path: PathBuf,
        #[source]
        source: Box<MigrationError>,
    },

    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl MigrationError {
    pub fn violation(record: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            record: record.into(),
            reason: reason.into(),
        }
    }

    /// Attach the document path to an error raised while reading it
    pub fn in_document(self, path: impl Into<PathBuf>) -> Self {
        Self::Document {
            path: path.into(),
            source: Box::new(self),
        }
    }

    pub fn is_schema_violation(&self) -> bool {
        match self {
            Self::SchemaViolation { .. } | Self::MissingTableReference { .. } => true,
            Self::Document { source, .. } => source.is_schema_violation(),
            _ => false,
        }
    }
}
