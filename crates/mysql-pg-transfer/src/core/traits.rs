//! Connection abstractions used by the transfer engine.
//!
//! - [`SourceReader`]: read-only access to the source database
//! - [`TargetWriter`]: the single read-write session on the target
//! - [`SchemaLoader`]: the external tool that loads the target DDL
//!
//! The engine only talks to these traits, so every component can run
//! against in-memory implementations in tests.

use std::fmt;

use async_trait::async_trait;

use crate::error::Result;

use super::schema::{IndexDescriptor, SourceTable, TableDescriptor};
use super::value::{Row, SqlValue};

/// Database engine reported by a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Engine {
    MySql,
    MariaDb,
    Postgres,
    /// Anything else, with the server's own version string.
    Other(String),
}

impl Engine {
    /// Classify a MySQL-protocol server from `VERSION()` and `@@version_comment`.
    pub fn from_mysql_version(version: &str, comment: &str) -> Self {
        let version_lower = version.to_lowercase();
        let comment_lower = comment.to_lowercase();
        if version_lower.contains("mariadb") || comment_lower.contains("mariadb") {
            Engine::MariaDb
        } else if comment_lower.contains("mysql") || is_plain_mysql_version(&version_lower) {
            Engine::MySql
        } else {
            Engine::Other(format!("{} ({})", version, comment))
        }
    }

    /// Classify a PostgreSQL-protocol server from `version()`.
    pub fn from_pg_version(version: &str) -> Self {
        if version.starts_with("PostgreSQL") {
            Engine::Postgres
        } else {
            Engine::Other(version.to_string())
        }
    }

    pub fn is_mysql_family(&self) -> bool {
        matches!(self, Engine::MySql | Engine::MariaDb)
    }
}

/// `8.0.36`, `5.7.44-log`, `8.0.36-debug`
fn is_plain_mysql_version(version: &str) -> bool {
    let base = version
        .strip_suffix("-log")
        .or_else(|| version.strip_suffix("-debug"))
        .unwrap_or(version);
    !base.is_empty() && base.chars().all(|c| c.is_ascii_digit() || c == '.')
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::MySql => f.write_str("MySQL"),
            Engine::MariaDb => f.write_str("MariaDB"),
            Engine::Postgres => f.write_str("PostgreSQL"),
            Engine::Other(v) => f.write_str(v),
        }
    }
}

/// Outcome of a single row insertion.
///
/// A rejection is a value, not an error: the loader's recovery cascade
/// consumes it. `Err` from [`TargetWriter::insert_row`] means the session
/// itself is gone and the run must stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The database refused the row. Any open transaction is now tainted.
    Rejected(String),
}

/// Read-only access to the source database.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Engine the server reports.
    async fn engine(&self) -> Result<Engine>;

    /// Base table names, sorted.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Columns (in ordinal order) and primary key of a table.
    async fn describe_table(&self, table: &str) -> Result<SourceTable>;

    /// Read up to `limit` rows starting at `offset`, in stable key order.
    ///
    /// Values come back in the order of `table.columns`.
    async fn read_page(&self, table: &SourceTable, limit: usize, offset: u64) -> Result<Vec<Row>>;

    async fn row_count(&self, table: &str) -> Result<u64>;

    async fn close(&self) {}
}

/// The single read-write session on the target database.
///
/// At most one transaction is open at a time. Methods take `&mut self` since
/// the index manager, trigger suppression and loader hold the session in turn.
#[async_trait]
pub trait TargetWriter: Send {
    async fn engine(&mut self) -> Result<Engine>;

    /// Base table names, sorted.
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    async fn describe_table(&mut self, table: &str) -> Result<TableDescriptor>;

    /// Plain column indexes of a table (no primary keys, no constraint-backed
    /// indexes, no expression or partial indexes).
    async fn list_indexes(&mut self, table: &str) -> Result<Vec<IndexDescriptor>>;

    async fn begin(&mut self) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;
    fn in_transaction(&self) -> bool;

    /// Prepare the insert statement used by every following [`insert_row`].
    ///
    /// [`insert_row`]: TargetWriter::insert_row
    async fn prepare_insert(&mut self, table: &TableDescriptor) -> Result<()>;

    async fn insert_row(&mut self, row: &[SqlValue]) -> Result<InsertOutcome>;

    async fn drop_index(&mut self, index: &IndexDescriptor) -> Result<()>;
    async fn create_index(&mut self, index: &IndexDescriptor) -> Result<()>;

    async fn set_triggers_enabled(&mut self, table: &str, enabled: bool) -> Result<()>;

    /// Move the sequence behind `column` so the next value follows `max_key`.
    async fn reset_sequence(&mut self, table: &str, column: &str, max_key: i64) -> Result<()>;

    /// Remove all rows from the given tables in one statement.
    async fn truncate_tables(&mut self, tables: &[String]) -> Result<()>;

    async fn row_count(&mut self, table: &str) -> Result<u64>;

    async fn close(&mut self) {}
}

/// External tool that (re)loads the target schema before data moves.
#[async_trait]
pub trait SchemaLoader: Send + Sync {
    /// Load the full schema into the target environment.
    async fn load_schema(&self, target_env: &str) -> Result<()>;

    /// Apply pending schema migrations to the target environment.
    async fn run_migrations(&self, target_env: &str) -> Result<()>;
}
