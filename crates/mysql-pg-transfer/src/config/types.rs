//! Configuration type definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Named database environments (e.g. `legacy`, `production`).
    pub environments: BTreeMap<String, DatabaseConfig>,

    /// Transfer behavior.
    pub migration: MigrationConfig,

    /// External schema tool invoked before data moves.
    #[serde(default)]
    pub schema_loader: Option<SchemaLoaderConfig>,
}

/// Connection settings of one environment.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database type: `mysql`, `mariadb` or `postgres`.
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 3306 for MySQL, 5432 for PostgreSQL).
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// PostgreSQL schema (default: "public"). Ignored for MySQL.
    #[serde(default)]
    pub schema: Option<String>,

    /// SSL mode: disable, require, verify-ca, verify-full
    /// (default: "require" for PostgreSQL, "preferred" for MySQL).
    #[serde(default)]
    pub ssl_mode: Option<String>,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

impl DatabaseConfig {
    pub fn is_mysql(&self) -> bool {
        matches!(self.r#type.to_lowercase().as_str(), "mysql" | "mariadb")
    }

    pub fn is_postgres(&self) -> bool {
        matches!(self.r#type.to_lowercase().as_str(), "postgres" | "postgresql")
    }

    /// Port, falling back to the engine's default.
    pub fn port(&self) -> u16 {
        self.port
            .unwrap_or(if self.is_postgres() { 5432 } else { 3306 })
    }

    /// PostgreSQL schema, falling back to `public`.
    pub fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or("public")
    }
}

/// Transfer behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Environment to read from.
    pub source_env: String,

    /// Environment to write to.
    pub target_env: String,

    /// Rows per page (default: 10000).
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Disable target triggers during each table's load (default: false).
    #[serde(default)]
    pub drop_triggers: bool,

    /// Drop and recreate target indexes around each table's load (default: true).
    #[serde(default = "default_true")]
    pub drop_indexes: bool,

    /// Do not load the target schema before transferring (default: false).
    #[serde(default)]
    pub skip_schema: bool,

    /// Do not run schema migrations before transferring (default: false).
    #[serde(default)]
    pub skip_migration_step: bool,

    /// Roll back every transaction instead of committing (default: false).
    #[serde(default)]
    pub dry_run: bool,

    /// Only these tables (default: all).
    #[serde(default)]
    pub include_tables: Vec<String>,

    /// Never these tables.
    #[serde(default)]
    pub exclude_tables: Vec<String>,

    /// Log a line per page (default: false).
    #[serde(default)]
    pub show_progress: bool,

    /// Replacement for zero dates (default: "1970-01-01 00:00:00").
    #[serde(default = "default_zero_timestamp_placeholder")]
    pub zero_timestamp_placeholder: String,
}

/// Commands for the external schema tool. Each is argv, run without a shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaLoaderConfig {
    /// Command that loads the full schema into the target.
    #[serde(default)]
    pub load_command: Vec<String>,

    /// Command that applies pending migrations to the target.
    #[serde(default)]
    pub migrate_command: Vec<String>,

    /// Working directory for both commands.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

fn default_page_size() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

fn default_zero_timestamp_placeholder() -> String {
    "1970-01-01 00:00:00".to_string()
}
