//! Error types for the transfer library.

use std::fmt;

use thiserror::Error;

use crate::verify::conformance::SchemaDiff;

/// Exit code for configuration errors (invalid YAML, missing fields).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code when source and target schemas do not conform.
pub const EXIT_SCHEMA_MISMATCH: u8 = 2;
/// Exit code when a database is not the expected engine.
pub const EXIT_ENGINE_MISMATCH: u8 = 3;
/// Exit code for connection and query failures.
pub const EXIT_CONNECTION_ERROR: u8 = 4;
/// Exit code when the external schema loader fails.
pub const EXIT_SCHEMA_LOAD_ERROR: u8 = 5;
/// Exit code for cancelled runs.
pub const EXIT_CANCELLED: u8 = 6;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;
/// Exit code for misuse of the target session (a bug, not an outage).
pub const EXIT_INTERNAL_ERROR: u8 = 8;

/// Phase of a table's pass in which a fatal error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TablePhase {
    Describe,
    DropIndexes,
    DisableTriggers,
    Load,
    EnableTriggers,
    RestoreIndexes,
    ResetSequence,
    Validate,
}

impl fmt::Display for TablePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TablePhase::Describe => "describe",
            TablePhase::DropIndexes => "drop-indexes",
            TablePhase::DisableTriggers => "disable-triggers",
            TablePhase::Load => "load",
            TablePhase::EnableTriggers => "enable-triggers",
            TablePhase::RestoreIndexes => "restore-indexes",
            TablePhase::ResetSequence => "reset-sequence",
            TablePhase::Validate => "validate",
        };
        f.write_str(name)
    }
}

/// Main error type for transfer operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Table or column sets differ between source and target
    #[error("Schema mismatch between source and target:\n{0}")]
    SchemaMismatch(SchemaDiff),

    /// A database is not the engine the run expects
    #[error("{side} is not {expected} (server reports: {found})")]
    EngineMismatch {
        side: &'static str,
        expected: &'static str,
        found: String,
    },

    /// Source database connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A fatal error during one table's pass
    #[error("Table {table} failed during {phase}")]
    TableFailed {
        table: String,
        phase: TablePhase,
        #[source]
        source: Box<MigrateError>,
    },

    /// The external schema loader failed
    #[error("Schema load failed: {0}")]
    SchemaLoad(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Transfer cancelled")]
    Cancelled,

    /// A session was driven out of order, e.g. BEGIN inside a transaction
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Wrap an error with the table and phase it happened in
    pub fn table_failed(table: impl Into<String>, phase: TablePhase, source: MigrateError) -> Self {
        MigrateError::TableFailed {
            table: table.into(),
            phase,
            source: Box::new(source),
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) | MigrateError::Json(_) => {
                EXIT_CONFIG_ERROR
            }
            MigrateError::SchemaMismatch(_) => EXIT_SCHEMA_MISMATCH,
            MigrateError::EngineMismatch { .. } => EXIT_ENGINE_MISMATCH,
            MigrateError::Source(_) | MigrateError::Target(_) | MigrateError::Pool { .. } => {
                EXIT_CONNECTION_ERROR
            }
            MigrateError::TableFailed { source, .. } => source.exit_code(),
            MigrateError::SchemaLoad(_) => EXIT_SCHEMA_LOAD_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            MigrateError::Internal(_) => EXIT_INTERNAL_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

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

/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
