//! Per-row, per-table and per-run outcome records.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::schema::PkValue;
use crate::error::Result;

/// Last stage a row reached before it was given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureStage {
    /// Rejected on insert (or on replay) with no applicable repair.
    InsertRejected,
    /// Still rejected after dropping invalid UTF-8.
    Utf8RepairFailed,
    /// Still rejected after ASCII transliteration.
    AsciiRepairFailed,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureStage::InsertRejected => "insert-rejected",
            FailureStage::Utf8RepairFailed => "utf8-repair-failed",
            FailureStage::AsciiRepairFailed => "ascii-repair-failed",
        })
    }
}

/// A row that was not migrated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub table: String,
    /// Zero-based position of the row in the source scan.
    pub row_number: u64,
    pub primary_key: Option<PkValue>,
    pub stage: FailureStage,
    /// The database's last rejection message.
    pub message: String,
}

impl ErrorRecord {
    /// Primary key if known, else `#<row number>`.
    pub fn row_id(&self) -> String {
        match &self.primary_key {
            Some(pk) => pk.to_string(),
            None => format!("#{}", self.row_number),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairKind {
    Utf8,
    Ascii,
}

/// A row that was migrated only after an encoding repair. Informational.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepairRecord {
    pub row_number: u64,
    pub primary_key: Option<PkValue>,
    pub kind: RepairKind,
}

/// A table whose source and target row counts differ after the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowCountMismatch {
    pub table: String,
    pub source_count: u64,
    pub target_count: u64,
    pub difference: u64,
}

impl RowCountMismatch {
    pub fn new(table: impl Into<String>, source_count: u64, target_count: u64) -> Self {
        Self {
            table: table.into(),
            source_count,
            target_count,
            difference: source_count.abs_diff(target_count),
        }
    }
}

impl fmt::Display for RowCountMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: source {} rows, target {} rows (difference {})",
            self.table, self.source_count, self.target_count, self.difference
        )
    }
}

/// Outcome of one table's pass.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    pub table: String,
    pub rows_read: u64,
    pub rows_migrated: u64,
    pub rows_failed: u64,
    pub errors: Vec<ErrorRecord>,
    pub repairs: Vec<RepairRecord>,
    pub indexes_restored: usize,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl TableReport {
    pub fn rows_per_second(&self) -> u64 {
        rate(self.rows_migrated, self.elapsed)
    }

    /// One-line progress summary.
    pub fn summary_line(&self) -> String {
        format!(
            "{}: {} rows, {} errors in {:.2}s ({} rows/sec)",
            self.table,
            self.rows_migrated,
            self.rows_failed,
            self.elapsed.as_secs_f64(),
            self.rows_per_second()
        )
    }

    /// Ids of failed rows, for the expanded listing.
    pub fn error_ids(&self) -> Vec<String> {
        self.errors.iter().map(ErrorRecord::row_id).collect()
    }
}

/// Aggregate outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub config_hash: Option<String>,
    pub tables: Vec<TableReport>,
    pub rows_migrated: u64,
    pub rows_failed: u64,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    pub rows_per_second: u64,
    pub mismatches: Vec<RowCountMismatch>,
    /// False when validation was skipped (dry-run).
    pub validated: bool,
}

impl MigrationReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            completed_at: None,
            dry_run,
            config_hash: None,
            tables: Vec::new(),
            rows_migrated: 0,
            rows_failed: 0,
            elapsed: Duration::ZERO,
            rows_per_second: 0,
            mismatches: Vec::new(),
            validated: false,
        }
    }

    pub fn add_table(&mut self, table: TableReport) {
        self.rows_migrated += table.rows_migrated;
        self.rows_failed += table.rows_failed;
        self.tables.push(table);
    }

    /// Stamp completion time and throughput.
    pub fn finish(&mut self, elapsed: Duration) {
        self.completed_at = Some(Utc::now());
        self.elapsed = elapsed;
        self.rows_per_second = rate(self.rows_migrated, elapsed);
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn rate(rows: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (rows as f64 / secs) as u64
    } else {
        rows
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, migrated: u64, failed: u64) -> TableReport {
        TableReport {
            table: name.into(),
            rows_read: migrated + failed,
            rows_migrated: migrated,
            rows_failed: failed,
            errors: Vec::new(),
            repairs: Vec::new(),
            indexes_restored: 0,
            elapsed: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_totals_accumulate() {
        let mut report = MigrationReport::new(false);
        report.add_table(table("users", 100, 1));
        report.add_table(table("orders", 50, 0));
        report.finish(Duration::from_secs(10));
        assert_eq!(report.rows_migrated, 150);
        assert_eq!(report.rows_failed, 1);
        assert_eq!(report.rows_per_second, 15);
        assert!(report.completed_at.is_some());
    }

    #[test]
    fn test_summary_line() {
        assert_eq!(
            table("users", 100, 2).summary_line(),
            "users: 100 rows, 2 errors in 2.00s (50 rows/sec)"
        );
    }

    #[test]
    fn test_error_row_id() {
        let mut record = ErrorRecord {
            table: "users".into(),
            row_number: 4,
            primary_key: Some(PkValue::Int(42)),
            stage: FailureStage::InsertRejected,
            message: "duplicate key".into(),
        };
        assert_eq!(record.row_id(), "42");
        record.primary_key = None;
        assert_eq!(record.row_id(), "#4");
    }

    #[test]
    fn test_mismatch_difference() {
        let m = RowCountMismatch::new("orders", 10, 12);
        assert_eq!(m.difference, 2);
        assert_eq!(m.to_string(), "orders: source 10 rows, target 12 rows (difference 2)");
    }

    #[test]
    fn test_report_json() {
        let mut report = MigrationReport::new(true);
        report.add_table(table("users", 3, 0));
        report.finish(Duration::from_millis(1500));
        let json = report.to_json().unwrap();
        assert!(json.contains("\"dry_run\": true"));
        assert!(json.contains("\"table\": \"users\""));
        assert!(json.contains("\"elapsed\": 1.5"));
    }

    #[test]
    fn test_failure_stage_serializes_kebab_case() {
        let json = serde_json::to_string(&FailureStage::AsciiRepairFailed).unwrap();
        assert_eq!(json, "\"ascii-repair-failed\"");
    }
}
