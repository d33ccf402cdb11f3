//! Error types for the synchronization library.

use thiserror::Error;

/// Main error type for synchronization operations.
///
/// Only configuration problems and the two run-fatal conditions (an
/// unreachable schema catalog, a missing record identifier) surface as
/// `SyncError` from a run. Everything that goes wrong while writing a single
/// table or scope tuple is reported as a [`crate::Diagnostic`] instead.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Mapping document could not be parsed.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Target database query error
    #[error("Target database error: {0}")]
    Store(#[from] mysql_async::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// The schema catalog of the target store could not be reached.
    #[error("Schema catalog unavailable: {0}")]
    SchemaUnavailable(String),

    /// The caller did not supply an identifier for the source record.
    #[error("Source record has no identifier - refusing to start the run")]
    MissingRecordId,

    /// A single write against the target store failed.
    #[error("Write failed for table {table}: {message}")]
    Write { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was abandoned by the caller (SIGINT, etc.)
    #[error("Synchronization cancelled")]
    Cancelled,
}

impl SyncError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        SyncError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Write error
    pub fn write(table: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Write {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Stable category string used in diagnostics and audit events.
    pub fn category(&self) -> &'static str {
        match self {
            SyncError::Config(_) => "config",
            SyncError::Mapping(_) => "mapping",
            SyncError::Store(_) => "store",
            SyncError::Pool { .. } => "pool",
            SyncError::SchemaUnavailable(_) => "schema_unavailable",
            SyncError::MissingRecordId => "missing_record_id",
            SyncError::Write { .. } => "write",
            SyncError::Io(_) => "io",
            SyncError::Yaml(_) => "yaml",
            SyncError::Json(_) => "json",
            SyncError::Cancelled => "cancelled",
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            SyncError::Config(_) | SyncError::Mapping(_) | SyncError::Yaml(_) => 2,
            SyncError::MissingRecordId | SyncError::Json(_) => 3,
            SyncError::Store(_) | SyncError::Pool { .. } | SyncError::SchemaUnavailable(_) => 4,
            SyncError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
