//! Scoped trigger suppression.

use tracing::{error, info, warn};

use crate::core::traits::TargetWriter;
use crate::error::Result;

/// Proof that a table's triggers are disabled.
///
/// Consume it with [`SuppressedTriggers::restore`] on every exit path of the
/// load. Dropping it unreleased leaves the triggers disabled and is logged
/// as an error.
#[must_use = "triggers stay disabled until restore() is awaited"]
#[derive(Debug)]
pub struct SuppressedTriggers {
    table: String,
    released: bool,
}

/// Disable every trigger on `table`, including internal ones.
pub async fn disable<W>(writer: &mut W, table: &str) -> Result<SuppressedTriggers>
where
    W: TargetWriter + ?Sized,
{
    writer.set_triggers_enabled(table, false).await?;
    info!("{}: triggers disabled", table);
    Ok(SuppressedTriggers {
        table: table.to_string(),
        released: false,
    })
}

impl SuppressedTriggers {
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Re-enable the table's triggers.
    ///
    /// Any transaction the load left open is rolled back first so the
    /// statement runs in a clean session.
    pub async fn restore<W>(mut self, writer: &mut W) -> Result<()>
    where
        W: TargetWriter + ?Sized,
    {
        self.released = true;
        if writer.in_transaction() {
            warn!("{}: rolling back open transaction before re-enabling triggers", self.table);
            writer.rollback().await?;
        }
        writer.set_triggers_enabled(&self.table, true).await?;
        info!("{}: triggers re-enabled", self.table);
        Ok(())
    }
}

impl Drop for SuppressedTriggers {
    fn drop(&mut self) {
        if !self.released {
            error!(
                "{}: triggers were left disabled; run ALTER TABLE ... ENABLE TRIGGER ALL",
                self.table
            );
        }
    }
}
