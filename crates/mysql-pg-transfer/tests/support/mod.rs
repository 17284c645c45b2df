//! In-memory source and target used by the integration tests.
//!
//! `MemoryTarget` behaves like a PostgreSQL session where it matters to the
//! loader: a rejected insert taints the open transaction, rows become
//! visible only on commit, text must be valid UTF-8 without NUL bytes, and
//! primary keys and unique indexes are enforced.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use mysql_pg_transfer::core::{ColumnDescriptor, SourceColumn, SourceKind};
use mysql_pg_transfer::{
    Engine, IndexDescriptor, InsertOutcome, MigrateError, MigrationOptions, Result, Row,
    SourceReader, SourceTable, SqlValue, TableDescriptor, TargetWriter,
};

/// Column spec shared by both fakes: name, target type, source kind.
pub type ColumnSpec = (&'static str, &'static str, SourceKind);

pub fn int_col(name: &'static str) -> ColumnSpec {
    (name, "bigint", SourceKind::Integer { unsigned: false })
}

pub fn text_col(name: &'static str) -> ColumnSpec {
    (name, "character varying", SourceKind::Text)
}

pub fn timestamp_col(name: &'static str) -> ColumnSpec {
    (name, "timestamp without time zone", SourceKind::Temporal)
}

pub fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn options() -> MigrationOptions {
    MigrationOptions {
        source_env: "legacy".into(),
        target_env: "production".into(),
        zero_timestamp_placeholder: epoch(),
        ..Default::default()
    }
}

pub fn descriptor(table: &str, columns: &[ColumnSpec], primary_key: &[&str]) -> TableDescriptor {
    TableDescriptor {
        name: table.to_string(),
        columns: columns
            .iter()
            .enumerate()
            .map(|(i, (name, sql_type, _))| ColumnDescriptor {
                name: name.to_string(),
                sql_type: sql_type.to_string(),
                ordinal: i as i32 + 1,
            })
            .collect(),
        primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
    }
}

// =============================================================================
// Source
// =============================================================================

struct SourceData {
    table: SourceTable,
    rows: Vec<Row>,
}

/// Read-only source holding rows in source column order.
#[derive(Clone)]
pub struct MemorySource {
    engine: Engine,
    tables: Arc<BTreeMap<String, SourceData>>,
    pages_read: Arc<AtomicUsize>,
}

impl MemorySource {
    pub fn builder() -> MemorySourceBuilder {
        MemorySourceBuilder {
            engine: Engine::MySql,
            tables: BTreeMap::new(),
        }
    }

    /// Number of `read_page` calls so far.
    pub fn pages_read(&self) -> usize {
        self.pages_read.load(Ordering::SeqCst)
    }
}

pub struct MemorySourceBuilder {
    engine: Engine,
    tables: BTreeMap<String, SourceData>,
}

impl MemorySourceBuilder {
    pub fn engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    pub fn table(
        mut self,
        name: &str,
        columns: &[ColumnSpec],
        primary_key: &[&str],
        rows: Vec<Row>,
    ) -> Self {
        let table = SourceTable {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(col, _, kind)| SourceColumn {
                    name: col.to_string(),
                    data_type: "test".into(),
                    kind: *kind,
                })
                .collect(),
            primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
        };
        self.tables.insert(name.to_string(), SourceData { table, rows });
        self
    }

    pub fn build(self) -> MemorySource {
        MemorySource {
            engine: self.engine,
            tables: Arc::new(self.tables),
            pages_read: Arc::new(AtomicUsize::new(0)),
        }
    }
}

fn missing(table: &str) -> MigrateError {
    MigrateError::pool(format!("no such table {}", table), "memory")
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn engine(&self) -> Result<Engine> {
        Ok(self.engine.clone())
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.tables.keys().cloned().collect())
    }

    async fn describe_table(&self, table: &str) -> Result<SourceTable> {
        self.tables
            .get(table)
            .map(|d| d.table.clone())
            .ok_or_else(|| missing(table))
    }

    async fn read_page(&self, table: &SourceTable, limit: usize, offset: u64) -> Result<Vec<Row>> {
        self.pages_read.fetch_add(1, Ordering::SeqCst);
        let data = self.tables.get(&table.name).ok_or_else(|| missing(&table.name))?;
        let positions: Vec<usize> = table
            .columns
            .iter()
            .map(|c| {
                data.table
                    .columns
                    .iter()
                    .position(|s| s.name == c.name)
                    .ok_or_else(|| missing(&c.name))
            })
            .collect::<Result<_>>()?;

        Ok(data
            .rows
            .iter()
            .skip(offset as usize)
            .take(limit)
            .map(|row| positions.iter().map(|&i| row[i].clone()).collect())
            .collect())
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        let data = self.tables.get(table).ok_or_else(|| missing(table))?;
        Ok(data.rows.len() as u64)
    }
}

// =============================================================================
// Target
// =============================================================================

/// Extra rejection rule, e.g. a column that only accepts ASCII.
pub type RejectRule = Arc<dyn Fn(&[SqlValue]) -> Option<String> + Send + Sync>;

pub struct MemTable {
    pub descriptor: TableDescriptor,
    pub rows: Vec<Row>,
    pub indexes: Vec<IndexDescriptor>,
    pub triggers_enabled: bool,
    pub sequence: Option<i64>,
    reject: Option<RejectRule>,
}

#[derive(Default)]
pub struct TargetState {
    pub engine: Option<Engine>,
    pub tables: BTreeMap<String, MemTable>,
    /// Session events in order, e.g. `begin`, `commit`, `disable_triggers users`.
    pub events: Vec<String>,
    tx: Option<Vec<(String, Row)>>,
    tainted: bool,
    prepared: Option<String>,
    inserts: usize,
    fail_after_inserts: Option<usize>,
    closed: bool,
}

/// Target session over shared state; clones observe the same database.
#[derive(Clone, Default)]
pub struct MemoryTarget {
    state: Arc<Mutex<TargetState>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        let target = Self::default();
        target.state().engine = Some(Engine::Postgres);
        target
    }

    pub fn state(&self) -> MutexGuard<'_, TargetState> {
        self.state.lock().unwrap()
    }

    pub fn with_engine(self, engine: Engine) -> Self {
        self.state().engine = Some(engine);
        self
    }

    pub fn with_table(self, descriptor: TableDescriptor) -> Self {
        self.state().tables.insert(
            descriptor.name.clone(),
            MemTable {
                descriptor,
                rows: Vec::new(),
                indexes: Vec::new(),
                triggers_enabled: true,
                sequence: None,
                reject: None,
            },
        );
        self
    }

    pub fn with_index(self, table: &str, name: &str, columns: &[&str], is_unique: bool) -> Self {
        self.state().table_mut(table).indexes.push(IndexDescriptor {
            name: name.to_string(),
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            is_unique,
        });
        self
    }

    pub fn with_rows(self, table: &str, rows: Vec<Row>) -> Self {
        self.state().table_mut(table).rows = rows;
        self
    }

    pub fn with_reject_rule(self, table: &str, rule: RejectRule) -> Self {
        self.state().table_mut(table).reject = Some(rule);
        self
    }

    /// Fail the session (fatal `Err`) on the insert after `n` successful ones.
    pub fn fail_after_inserts(self, n: usize) -> Self {
        self.state().fail_after_inserts = Some(n);
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state().table_mut(table).rows.clone()
    }

    pub fn indexes(&self, table: &str) -> Vec<IndexDescriptor> {
        self.state().table_mut(table).indexes.clone()
    }

    pub fn triggers_enabled(&self, table: &str) -> bool {
        self.state().table_mut(table).triggers_enabled
    }

    pub fn sequence(&self, table: &str) -> Option<i64> {
        self.state().table_mut(table).sequence
    }

    pub fn events(&self) -> Vec<String> {
        self.state().events.clone()
    }

    pub fn in_open_transaction(&self) -> bool {
        self.state().tx.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

impl TargetState {
    fn table_mut(&mut self, table: &str) -> &mut MemTable {
        self.tables
            .get_mut(table)
            .unwrap_or_else(|| panic!("unknown table {}", table))
    }

    fn table(&self, table: &str) -> Result<&MemTable> {
        self.tables.get(table).ok_or_else(|| missing(table))
    }

    fn event(&mut self, e: impl Into<String>) {
        self.events.push(e.into());
    }

    /// The reason PostgreSQL would refuse `row` into `table`, if any.
    fn violation(&self, table: &str, row: &[SqlValue]) -> Result<Option<String>> {
        let t = self.table(table)?;

        for value in row {
            if let SqlValue::Text(bytes) = value {
                if std::str::from_utf8(bytes).is_err() {
                    return Ok(Some("invalid byte sequence for encoding \"UTF8\" (22021)".into()));
                }
                if bytes.contains(&0) {
                    return Ok(Some(
                        "invalid byte sequence for encoding \"UTF8\": 0x00 (22021)".into(),
                    ));
                }
            }
        }

        if let Some(rule) = &t.reject {
            if let Some(reason) = rule(row) {
                return Ok(Some(reason));
            }
        }

        let pending: Vec<&Row> = self
            .tx
            .iter()
            .flatten()
            .filter(|(name, _)| name == table)
            .map(|(_, r)| r)
            .collect();
        let existing = t.rows.iter().chain(pending);

        let mut keys: Vec<(String, Vec<usize>)> = Vec::new();
        if !t.descriptor.primary_key.is_empty() {
            keys.push((format!("{}_pkey", table), positions(&t.descriptor, &t.descriptor.primary_key)));
        }
        for index in t.indexes.iter().filter(|i| i.is_unique) {
            keys.push((index.name.clone(), positions(&t.descriptor, &index.columns)));
        }

        for other in existing {
            for (name, cols) in &keys {
                if cols.iter().all(|&i| row[i] == other[i]) {
                    return Ok(Some(format!(
                        "duplicate key value violates unique constraint \"{}\" (23505)",
                        name
                    )));
                }
            }
        }
        Ok(None)
    }
}

fn positions(descriptor: &TableDescriptor, columns: &[String]) -> Vec<usize> {
    columns
        .iter()
        .filter_map(|c| descriptor.position(c))
        .collect()
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    async fn engine(&mut self) -> Result<Engine> {
        Ok(self.state().engine.clone().unwrap_or(Engine::Postgres))
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        Ok(self.state().tables.keys().cloned().collect())
    }

    async fn describe_table(&mut self, table: &str) -> Result<TableDescriptor> {
        Ok(self.state().table(table)?.descriptor.clone())
    }

    async fn list_indexes(&mut self, table: &str) -> Result<Vec<IndexDescriptor>> {
        Ok(self.state().table(table)?.indexes.clone())
    }

    async fn begin(&mut self) -> Result<()> {
        let mut s = self.state();
        if s.tx.is_some() {
            return Err(MigrateError::Internal("begin: transaction already open".into()));
        }
        s.tx = Some(Vec::new());
        s.tainted = false;
        s.event("begin");
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let mut s = self.state();
        let Some(pending) = s.tx.take() else {
            return Err(MigrateError::Internal("commit: no transaction open".into()));
        };
        if s.tainted {
            // COMMIT of an aborted transaction rolls back
            s.tainted = false;
            s.event("rollback");
            return Ok(());
        }
        for (table, row) in pending {
            s.table_mut(&table).rows.push(row);
        }
        s.event("commit");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let mut s = self.state();
        if s.tx.take().is_some() {
            s.tainted = false;
            s.event("rollback");
        }
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.state().tx.is_some()
    }

    async fn prepare_insert(&mut self, table: &TableDescriptor) -> Result<()> {
        let mut s = self.state();
        s.table(&table.name)?;
        s.prepared = Some(table.name.clone());
        Ok(())
    }

    async fn insert_row(&mut self, row: &[SqlValue]) -> Result<InsertOutcome> {
        let mut s = self.state();
        let table = s
            .prepared
            .clone()
            .ok_or_else(|| MigrateError::Internal("insert_row: no prepared insert".into()))?;

        if let Some(limit) = s.fail_after_inserts {
            if s.inserts >= limit {
                return Err(MigrateError::pool("connection reset by peer", "insert_row"));
            }
        }

        if s.tainted {
            return Ok(InsertOutcome::Rejected(
                "current transaction is aborted, commands ignored until end of transaction block (25P02)"
                    .into(),
            ));
        }

        if let Some(reason) = s.violation(&table, row)? {
            if s.tx.is_some() {
                s.tainted = true;
            }
            return Ok(InsertOutcome::Rejected(reason));
        }

        s.inserts += 1;
        let row = row.to_vec();
        match s.tx.as_mut() {
            Some(pending) => pending.push((table, row)),
            None => s.table_mut(&table).rows.push(row),
        }
        Ok(InsertOutcome::Inserted)
    }

    async fn drop_index(&mut self, index: &IndexDescriptor) -> Result<()> {
        let mut s = self.state();
        s.table_mut(&index.table).indexes.retain(|i| i.name != index.name);
        s.event(format!("drop_index {}", index.name));
        Ok(())
    }

    async fn create_index(&mut self, index: &IndexDescriptor) -> Result<()> {
        let mut s = self.state();
        s.table_mut(&index.table).indexes.push(index.clone());
        s.event(format!("create_index {}", index.name));
        Ok(())
    }

    async fn set_triggers_enabled(&mut self, table: &str, enabled: bool) -> Result<()> {
        let mut s = self.state();
        s.table(table)?;
        s.table_mut(table).triggers_enabled = enabled;
        let verb = if enabled { "enable" } else { "disable" };
        s.event(format!("{}_triggers {}", verb, table));
        Ok(())
    }

    async fn reset_sequence(&mut self, table: &str, column: &str, max_key: i64) -> Result<()> {
        let mut s = self.state();
        s.table_mut(table).sequence = Some(max_key);
        s.event(format!("reset_sequence {}.{} {}", table, column, max_key));
        Ok(())
    }

    async fn truncate_tables(&mut self, tables: &[String]) -> Result<()> {
        let mut s = self.state();
        for table in tables {
            s.table_mut(table).rows.clear();
        }
        s.event(format!("truncate {}", tables.join(", ")));
        Ok(())
    }

    async fn row_count(&mut self, table: &str) -> Result<u64> {
        Ok(self.state().table(table)?.rows.len() as u64)
    }

    async fn close(&mut self) {
        self.state().closed = true;
    }
}
