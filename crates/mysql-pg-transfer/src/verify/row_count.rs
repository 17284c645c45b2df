//! Post-run row count comparison.

use tracing::{info, warn};

use crate::core::traits::{SourceReader, TargetWriter};
use crate::error::{MigrateError, Result, TablePhase};
use crate::report::RowCountMismatch;

/// Compare source and target row counts of every table in `tables`.
///
/// Counts are whole-table; rows recorded as errors show up here as a
/// shortfall on the target side.
pub async fn validate_row_counts<S, W>(
    source: &S,
    target: &mut W,
    tables: &[String],
) -> Result<Vec<RowCountMismatch>>
where
    S: SourceReader + ?Sized,
    W: TargetWriter + ?Sized,
{
    let mut mismatches = Vec::new();
    for table in tables {
        let source_count = source
            .row_count(table)
            .await
            .map_err(|e| MigrateError::table_failed(table.as_str(), TablePhase::Validate, e))?;
        let target_count = target
            .row_count(table)
            .await
            .map_err(|e| MigrateError::table_failed(table.as_str(), TablePhase::Validate, e))?;
        if source_count != target_count {
            let mismatch = RowCountMismatch::new(table.as_str(), source_count, target_count);
            warn!("Row count mismatch: {}", mismatch);
            mismatches.push(mismatch);
        }
    }

    if mismatches.is_empty() {
        info!("Row counts match for {} tables", tables.len());
    }
    Ok(mismatches)
}
