//! Transfer orchestrator - main workflow coordinator.

use std::collections::BTreeMap;
use std::pin::pin;
use std::time::Instant;

use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, MigrationOptions};
use crate::core::schema::{SourceTable, TableDescriptor};
use crate::core::traits::{Engine, SchemaLoader, SourceReader, TargetWriter};
use crate::drivers::{MysqlReader, PgWriter};
use crate::error::{MigrateError, Result, TablePhase};
use crate::report::{MigrationReport, RowCountMismatch, TableReport};
use crate::schema_loader::{self, NoopSchemaLoader};
use crate::transfer::{extract, triggers, BatchLoader, IndexManager, LoadOutcome, ValueNormalizer};
use crate::verify::{conformance, validate_row_counts, SchemaDiff, SchemaShape};

/// Both sides' view of the tables a run covers, in target order.
struct Plan {
    tables: Vec<String>,
    targets: BTreeMap<String, TableDescriptor>,
    sources: BTreeMap<String, SourceTable>,
}

/// Drives one transfer run over a source reader and a target session.
pub struct Orchestrator<S, W> {
    source: S,
    target: W,
    options: MigrationOptions,
    schema_loader: Box<dyn SchemaLoader>,
    config_hash: Option<String>,
    normalizer: ValueNormalizer,
    indexes: IndexManager,
}

impl Orchestrator<MysqlReader, PgWriter> {
    /// Connect to the configured source and target environments.
    pub async fn connect(config: &Config, options: MigrationOptions) -> Result<Self> {
        let source = MysqlReader::new(config.environment(&options.source_env)?).await?;
        let target = PgWriter::new(config.environment(&options.target_env)?).await?;

        Ok(Self::new(source, target, options)
            .with_schema_loader(schema_loader::from_config(config.schema_loader.as_ref()))
            .with_config_hash(config.hash()))
    }
}

impl<S, W> Orchestrator<S, W>
where
    S: SourceReader,
    W: TargetWriter,
{
    pub fn new(source: S, target: W, options: MigrationOptions) -> Self {
        let normalizer = ValueNormalizer::new(options.zero_timestamp_placeholder);
        let indexes = IndexManager::new(options.drop_indexes, options.dry_run);
        Self {
            source,
            target,
            options,
            schema_loader: Box::new(NoopSchemaLoader),
            config_hash: None,
            normalizer,
            indexes,
        }
    }

    pub fn with_schema_loader(mut self, loader: Box<dyn SchemaLoader>) -> Self {
        self.schema_loader = loader;
        self
    }

    pub fn with_config_hash(mut self, hash: String) -> Self {
        self.config_hash = Some(hash);
        self
    }

    /// Run the full transfer.
    ///
    /// Row rejections and row count mismatches end up in the report; only
    /// pre-flight failures, lost connections and cancellation return `Err`.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<MigrationReport> {
        let result = self.execute(&cancel).await;
        self.close().await;
        result
    }

    /// Engine and conformance checks only. Returns the tables a run would cover.
    pub async fn check(mut self) -> Result<Vec<String>> {
        let result = async {
            self.check_engines().await?;
            let plan = self.plan().await?;
            Ok::<_, MigrateError>(plan.tables)
        }
        .await;
        self.close().await;
        result
    }

    /// Row count comparison only, over the tables a run would cover.
    pub async fn validate(mut self) -> Result<Vec<RowCountMismatch>> {
        let result = async {
            let target_tables = self.target.list_tables().await?;
            let tables = self.options.select(&target_tables);
            validate_row_counts(&self.source, &mut self.target, &tables).await
        }
        .await;
        self.close().await;
        result
    }

    async fn execute(&mut self, cancel: &CancellationToken) -> Result<MigrationReport> {
        let started = Instant::now();
        let mut report = MigrationReport::new(self.options.dry_run);
        report.config_hash = self.config_hash.clone();
        info!(
            "Starting transfer run {}{}",
            report.run_id,
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        info!("Phase 1: Checking engines");
        self.check_engines().await?;

        info!("Phase 2: Preparing target schema");
        self.prepare_schema().await?;

        info!("Phase 3: Checking schema conformance");
        let plan = self.plan().await?;
        info!("Found {} tables to transfer", plan.tables.len());

        if cancel.is_cancelled() {
            warn!("Cancelled before any data was moved");
            return Err(MigrateError::Cancelled);
        }

        if !self.options.dry_run && !plan.tables.is_empty() {
            info!("Truncating {} target tables", plan.tables.len());
            self.target.truncate_tables(&plan.tables).await?;
        }

        info!("Phase 4: Transferring data");
        for name in &plan.tables {
            if cancel.is_cancelled() {
                warn!("Cancelled before table {}", name);
                return Err(MigrateError::Cancelled);
            }

            let (Some(target_table), Some(source_table)) =
                (plan.targets.get(name), plan.sources.get(name))
            else {
                continue;
            };

            let table_report = self.transfer_table(target_table, source_table).await?;
            info!("{}", table_report.summary_line());
            if !table_report.errors.is_empty() {
                warn!(
                    "{}: rows not migrated: {}",
                    name,
                    table_report.error_ids().join(", ")
                );
            }
            report.add_table(table_report);
        }

        if self.options.dry_run {
            info!("Dry run: skipping row count validation");
        } else {
            info!("Phase 5: Validating row counts");
            report.mismatches =
                validate_row_counts(&self.source, &mut self.target, &plan.tables).await?;
            report.validated = true;
        }

        report.finish(started.elapsed());
        info!(
            "Transfer complete: {} rows migrated, {} rows failed, {} tables in {:.1}s ({} rows/sec)",
            report.rows_migrated,
            report.rows_failed,
            report.tables.len(),
            report.elapsed.as_secs_f64(),
            report.rows_per_second
        );
        Ok(report)
    }

    async fn check_engines(&mut self) -> Result<()> {
        let source = self.source.engine().await?;
        if !source.is_mysql_family() {
            return Err(MigrateError::EngineMismatch {
                side: "source",
                expected: "MySQL",
                found: source.to_string(),
            });
        }

        let target = self.target.engine().await?;
        if target != Engine::Postgres {
            return Err(MigrateError::EngineMismatch {
                side: "target",
                expected: "PostgreSQL",
                found: target.to_string(),
            });
        }

        info!("Source is {}, target is {}", source, target);
        Ok(())
    }

    async fn prepare_schema(&mut self) -> Result<()> {
        let env = &self.options.target_env;
        if self.options.dry_run {
            info!("Dry run: skipping schema load and migrations");
            return Ok(());
        }
        if self.options.skip_schema {
            info!("Skipping schema load");
        } else {
            self.schema_loader.load_schema(env).await?;
        }
        if self.options.skip_migration_step {
            info!("Skipping schema migrations");
        } else {
            self.schema_loader.run_migrations(env).await?;
        }
        Ok(())
    }

    /// Describe the selected tables on both sides and check they conform.
    async fn plan(&mut self) -> Result<Plan> {
        let target_tables = self.options.select(&self.target.list_tables().await?);
        let source_tables = self.options.select(&self.source.list_tables().await?);

        let mut targets = BTreeMap::new();
        for name in &target_tables {
            targets.insert(name.clone(), self.target.describe_table(name).await?);
        }
        let mut sources = BTreeMap::new();
        for name in &source_tables {
            sources.insert(name.clone(), self.source.describe_table(name).await?);
        }

        let target_shape: SchemaShape = targets
            .iter()
            .map(|(name, t)| (name.clone(), t.column_names().into_iter().collect()))
            .collect();
        let source_shape: SchemaShape = sources
            .iter()
            .map(|(name, t)| (name.clone(), t.column_names().into_iter().collect()))
            .collect();
        conformance::check(&source_shape, &target_shape)?;

        Ok(Plan {
            tables: target_tables,
            targets,
            sources,
        })
    }

    async fn transfer_table(
        &mut self,
        target_table: &TableDescriptor,
        source_table: &SourceTable,
    ) -> Result<TableReport> {
        let name = target_table.name.as_str();
        let started = Instant::now();
        info!("Transferring {}", name);

        let projected = source_table.project(target_table).ok_or_else(|| {
            MigrateError::table_failed(
                name,
                TablePhase::Describe,
                MigrateError::SchemaMismatch(SchemaDiff::between(
                    &single(name, source_table.column_names()),
                    &single(name, target_table.column_names()),
                )),
            )
        })?;

        let dropped = self
            .indexes
            .drop(&mut self.target, name)
            .await
            .map_err(|e| MigrateError::table_failed(name, TablePhase::DropIndexes, e))?;

        let suppressed = if self.options.drop_triggers {
            let guard = triggers::disable(&mut self.target, name)
                .await
                .map_err(|e| MigrateError::table_failed(name, TablePhase::DisableTriggers, e))?;
            Some(guard)
        } else {
            None
        };

        let loaded = self.load_table(target_table, &projected).await;

        if let Some(guard) = suppressed {
            if let Err(e) = guard.restore(&mut self.target).await {
                if loaded.is_ok() {
                    return Err(MigrateError::table_failed(name, TablePhase::EnableTriggers, e));
                }
                error!("{}: failed to re-enable triggers: {}", name, e);
            }
        }

        let outcome = match loaded {
            Ok(outcome) => outcome,
            Err(e) => {
                if !dropped.is_empty() {
                    let names: Vec<&str> = dropped.iter().map(|i| i.name.as_str()).collect();
                    error!("{}: indexes left dropped: {}", name, names.join(", "));
                }
                return Err(MigrateError::table_failed(name, TablePhase::Load, e));
            }
        };

        let indexes_restored = self
            .indexes
            .restore(&mut self.target, &dropped)
            .await
            .map_err(|e| MigrateError::table_failed(name, TablePhase::RestoreIndexes, e))?;

        if !self.options.dry_run {
            if let (Some((_, column)), Some(max_key)) =
                (target_table.sequence_key(), outcome.max_key)
            {
                debug!("{}: resetting sequence of {} to {}", name, column, max_key);
                self.target
                    .reset_sequence(name, column, max_key)
                    .await
                    .map_err(|e| MigrateError::table_failed(name, TablePhase::ResetSequence, e))?;
            }
        }

        let rows_failed = outcome.rows_failed();
        Ok(TableReport {
            table: name.to_string(),
            rows_read: outcome.rows_read,
            rows_migrated: outcome.rows_migrated,
            rows_failed,
            errors: outcome.errors,
            repairs: outcome.repairs,
            indexes_restored,
            elapsed: started.elapsed(),
        })
    }

    async fn load_table(
        &mut self,
        target_table: &TableDescriptor,
        source_table: &SourceTable,
    ) -> Result<LoadOutcome> {
        let mut loader = BatchLoader::new(
            &mut self.target,
            target_table,
            &self.normalizer,
            self.options.dry_run,
        )
        .await?;

        let mut pages = pin!(extract(&self.source, source_table, self.options.page_size));
        while let Some(page) = pages.try_next().await? {
            let number = page.info.number;
            loader.load_page(page).await?;
            if self.options.show_progress {
                let so_far = loader.outcome();
                info!(
                    "{}: page {} done, {} rows read, {} migrated, {} errors",
                    target_table.name,
                    number,
                    so_far.rows_read,
                    so_far.rows_migrated,
                    so_far.errors.len()
                );
            }
        }
        Ok(loader.finish())
    }

    async fn close(&mut self) {
        self.source.close().await;
        self.target.close().await;
    }
}

fn single(table: &str, columns: Vec<String>) -> SchemaShape {
    BTreeMap::from([(table.to_string(), columns.into_iter().collect())])
}
