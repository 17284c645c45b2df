//! Transactional batch loading with row-level recovery.
//!
//! Each page is inserted inside one transaction. Rows the database accepted
//! so far in that transaction are kept in memory as "in-principle" rows:
//! they are not durable until the commit. When a row is rejected the
//! transaction is tainted (PostgreSQL refuses every further statement), so
//! the loader walks a fixed recovery sequence:
//!
//! 1. roll back and replay the in-principle rows in a fresh transaction,
//!    then resolve it;
//! 2. retry the failed row alone with invalid UTF-8 dropped;
//! 3. retry it alone transliterated to ASCII;
//! 4. record it as an error (`ascii-repair-failed`).
//!
//! Rows lost while replaying are recorded as `insert-rejected`.
//!
//! A fresh transaction is then opened for the rest of the page. Every
//! source row ends up either committed exactly once or in the error list.

use std::collections::VecDeque;
use std::mem;

use tracing::{debug, warn};

use crate::core::schema::TableDescriptor;
use crate::core::traits::{InsertOutcome, TargetWriter};
use crate::core::value::{Page, Row, SqlValue};
use crate::error::Result;
use crate::report::{ErrorRecord, FailureStage, RepairKind, RepairRecord};
use crate::transfer::normalize::{repair_utf8, transliterate_ascii, ValueNormalizer};

/// What a table's load produced.
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub rows_read: u64,
    /// Rows committed (or, in dry-run, rows that would have been).
    pub rows_migrated: u64,
    pub errors: Vec<ErrorRecord>,
    pub repairs: Vec<RepairRecord>,
    /// Largest single-column integer key among migrated rows.
    pub max_key: Option<i64>,
}

impl LoadOutcome {
    pub fn rows_failed(&self) -> u64 {
        self.errors.len() as u64
    }
}

#[derive(Debug)]
struct Pending {
    row_number: u64,
    row: Row,
}

/// Recovery states for one rejected row.
enum Recovery {
    TaintedReplay {
        failed: Pending,
        reason: String,
    },
    Utf8Repair {
        failed: Pending,
    },
    AsciiRepair {
        failed: Pending,
        candidate: Row,
    },
    Unrecoverable {
        failed: Pending,
        stage: FailureStage,
        reason: String,
    },
}

/// Loads pages of one table through a [`TargetWriter`].
pub struct BatchLoader<'a, W: TargetWriter + ?Sized> {
    writer: &'a mut W,
    table: &'a TableDescriptor,
    normalizer: &'a ValueNormalizer,
    dry_run: bool,
    sequence_column: Option<usize>,
    in_principle: Vec<Pending>,
    outcome: LoadOutcome,
}

impl<'a, W: TargetWriter + ?Sized> BatchLoader<'a, W> {
    /// Prepare the table's insert statement and return a loader for it.
    ///
    /// In dry-run every transaction is rolled back instead of committed;
    /// the recovery sequence and reporting are otherwise identical.
    pub async fn new(
        writer: &'a mut W,
        table: &'a TableDescriptor,
        normalizer: &'a ValueNormalizer,
        dry_run: bool,
    ) -> Result<Self> {
        writer.prepare_insert(table).await?;
        Ok(Self {
            writer,
            table,
            normalizer,
            dry_run,
            sequence_column: table.sequence_key().map(|(i, _)| i),
            in_principle: Vec::new(),
            outcome: LoadOutcome::default(),
        })
    }

    pub fn outcome(&self) -> &LoadOutcome {
        &self.outcome
    }

    pub fn finish(self) -> LoadOutcome {
        self.outcome
    }

    /// Insert one page. Returns `Err` only when the target session fails;
    /// rejected rows are recovered or recorded.
    pub async fn load_page(&mut self, page: Page) -> Result<()> {
        debug!(
            "{}: loading page {} ({} rows)",
            self.table.name,
            page.info.number,
            page.rows.len()
        );
        self.writer.begin().await?;

        for row in page.rows {
            let row_number = self.outcome.rows_read;
            self.outcome.rows_read += 1;
            let row = self.normalizer.normalize_row(row);

            match self.writer.insert_row(&row).await? {
                InsertOutcome::Inserted => self.in_principle.push(Pending { row_number, row }),
                InsertOutcome::Rejected(reason) => {
                    self.recover(Pending { row_number, row }, reason).await?;
                    self.writer.begin().await?;
                }
            }
        }

        let pending = mem::take(&mut self.in_principle);
        self.resolve(pending).await
    }

    async fn recover(&mut self, failed: Pending, reason: String) -> Result<()> {
        let mut state = Recovery::TaintedReplay { failed, reason };
        loop {
            state = match state {
                Recovery::TaintedReplay { failed, reason } => {
                    debug!(
                        "{}: row {} rejected ({}), replaying {} rows",
                        self.table.name,
                        failed.row_number,
                        reason,
                        self.in_principle.len()
                    );
                    self.writer.rollback().await?;
                    let pending = mem::take(&mut self.in_principle);
                    if !pending.is_empty() {
                        let accepted = self.replay(pending).await?;
                        self.resolve(accepted).await?;
                    }
                    Recovery::Utf8Repair { failed }
                }

                // Both retries always run, even when a repair leaves the row as it was.
                Recovery::Utf8Repair { failed } => {
                    let candidate = repair_utf8(&failed.row).unwrap_or_else(|| failed.row.clone());
                    match self.insert_alone(&candidate).await? {
                        InsertOutcome::Inserted => {
                            self.repaired(failed.row_number, &candidate, RepairKind::Utf8);
                            return Ok(());
                        }
                        InsertOutcome::Rejected(_) => Recovery::AsciiRepair { failed, candidate },
                    }
                }

                Recovery::AsciiRepair { failed, candidate } => {
                    let ascii = transliterate_ascii(&candidate).unwrap_or(candidate);
                    match self.insert_alone(&ascii).await? {
                        InsertOutcome::Inserted => {
                            self.repaired(failed.row_number, &ascii, RepairKind::Ascii);
                            return Ok(());
                        }
                        InsertOutcome::Rejected(reason) => Recovery::Unrecoverable {
                            failed,
                            stage: FailureStage::AsciiRepairFailed,
                            reason,
                        },
                    }
                }

                Recovery::Unrecoverable {
                    failed,
                    stage,
                    reason,
                } => {
                    self.record_error(failed, stage, reason);
                    return Ok(());
                }
            };
        }
    }

    /// Re-insert previously accepted rows in a new transaction.
    ///
    /// A row rejected during replay is recorded as an error and the attempt
    /// restarts with the rows accepted so far. Each restart removes one row,
    /// so this terminates. On return the transaction holding the accepted
    /// rows is still open.
    async fn replay(&mut self, rows: Vec<Pending>) -> Result<Vec<Pending>> {
        let mut remaining: VecDeque<Pending> = rows.into();
        let mut accepted: Vec<Pending> = Vec::with_capacity(remaining.len());

        'attempt: loop {
            self.writer.begin().await?;

            for i in 0..accepted.len() {
                if let InsertOutcome::Rejected(reason) =
                    self.writer.insert_row(&accepted[i].row).await?
                {
                    self.writer.rollback().await?;
                    let lost = accepted.remove(i);
                    self.record_error(lost, FailureStage::InsertRejected, reason);
                    continue 'attempt;
                }
            }

            while let Some(pending) = remaining.pop_front() {
                match self.writer.insert_row(&pending.row).await? {
                    InsertOutcome::Inserted => accepted.push(pending),
                    InsertOutcome::Rejected(reason) => {
                        self.writer.rollback().await?;
                        self.record_error(pending, FailureStage::InsertRejected, reason);
                        continue 'attempt;
                    }
                }
            }

            return Ok(accepted);
        }
    }

    /// Try one row in its own transaction, resolving it on success.
    async fn insert_alone(&mut self, row: &[SqlValue]) -> Result<InsertOutcome> {
        self.writer.begin().await?;
        let outcome = self.writer.insert_row(row).await?;
        match outcome {
            InsertOutcome::Inserted => self.end_transaction().await?,
            InsertOutcome::Rejected(_) => self.writer.rollback().await?,
        }
        Ok(outcome)
    }

    /// Commit (or roll back in dry-run) and count the rows as migrated.
    async fn resolve(&mut self, rows: Vec<Pending>) -> Result<()> {
        self.end_transaction().await?;
        for pending in &rows {
            self.count_migrated(&pending.row);
        }
        Ok(())
    }

    async fn end_transaction(&mut self) -> Result<()> {
        if self.dry_run {
            self.writer.rollback().await
        } else {
            self.writer.commit().await
        }
    }

    fn count_migrated(&mut self, row: &[SqlValue]) {
        self.outcome.rows_migrated += 1;
        if let Some(key) = self
            .sequence_column
            .and_then(|i| row.get(i))
            .and_then(SqlValue::as_i64)
        {
            self.outcome.max_key = Some(self.outcome.max_key.map_or(key, |m| m.max(key)));
        }
    }

    fn repaired(&mut self, row_number: u64, row: &[SqlValue], kind: RepairKind) {
        debug!("{}: row {} migrated after {:?} repair", self.table.name, row_number, kind);
        self.count_migrated(row);
        self.outcome.repairs.push(RepairRecord {
            row_number,
            primary_key: self.table.primary_key_of(row),
            kind,
        });
    }

    fn record_error(&mut self, failed: Pending, stage: FailureStage, message: String) {
        let record = ErrorRecord {
            table: self.table.name.clone(),
            row_number: failed.row_number,
            primary_key: self.table.primary_key_of(&failed.row),
            stage,
            message,
        };
        warn!(
            "{}: row {} not migrated ({}): {}",
            record.table,
            record.row_id(),
            record.stage,
            record.message
        );
        self.outcome.errors.push(record);
    }
}
