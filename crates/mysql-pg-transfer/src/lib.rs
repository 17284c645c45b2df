//! # mysql-pg-transfer
//!
//! Bulk data transfer from MySQL (or MariaDB) into an existing PostgreSQL
//! schema.
//!
//! The target schema is owned by an external tool and is authoritative: the
//! library checks that both sides have the same tables and columns, then
//! copies every row through a transactional loader that isolates rejected
//! rows instead of failing the run:
//!
//! - **Paged extraction** from the source in stable key order
//! - **Normalization** of MySQL zero dates to a configurable placeholder
//! - **Row-level recovery** with UTF-8 and ASCII repair fallbacks
//! - **Index and trigger suppression** around each table's load
//! - **Row count validation** after the run
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_pg_transfer::{Config, MigrationOptions, OptionOverrides, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> mysql_pg_transfer::Result<()> {
//! let config = Config::load("config.yaml")?;
//! let options = MigrationOptions::resolve(&config, &OptionOverrides::default())?;
//! let orchestrator = Orchestrator::connect(&config, options).await?;
//! let report = orchestrator.run(CancellationToken::new()).await?;
//! println!("Migrated {} rows", report.rows_migrated);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod report;
pub mod schema_loader;
pub mod transfer;
pub mod verify;

// Re-exports for convenient access
pub use crate::config::{Config, DatabaseConfig, MigrationOptions, OptionOverrides};
pub use crate::core::{
    Engine, IndexDescriptor, InsertOutcome, PkValue, Row, SchemaLoader, SourceReader, SourceTable,
    SqlValue, TableDescriptor, TargetWriter,
};
pub use drivers::{MysqlReader, PgWriter, SslMode};
pub use error::{MigrateError, Result, TablePhase};
pub use orchestrator::Orchestrator;
pub use report::{
    ErrorRecord, FailureStage, MigrationReport, RepairKind, RepairRecord, RowCountMismatch,
    TableReport,
};
pub use schema_loader::{CommandSchemaLoader, NoopSchemaLoader};
