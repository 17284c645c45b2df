//! Dropping a table's plain indexes before bulk load and restoring them after.

use tracing::{debug, info, warn};

use crate::core::schema::IndexDescriptor;
use crate::core::traits::TargetWriter;
use crate::error::Result;

/// Drops and restores plain indexes around a table's load.
///
/// Disabled in dry-run, where nothing is committed and the drop would be
/// the only durable effect.
#[derive(Debug, Clone, Copy)]
pub struct IndexManager {
    enabled: bool,
}

impl IndexManager {
    pub fn new(drop_indexes: bool, dry_run: bool) -> Self {
        Self {
            enabled: drop_indexes && !dry_run,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Drop every plain index on `table` in one transaction and return their
    /// definitions. On failure the transaction is rolled back and no index is
    /// left dropped.
    pub async fn drop<W>(&self, writer: &mut W, table: &str) -> Result<Vec<IndexDescriptor>>
    where
        W: TargetWriter + ?Sized,
    {
        if !self.enabled {
            return Ok(Vec::new());
        }

        let indexes = writer.list_indexes(table).await?;
        if indexes.is_empty() {
            return Ok(indexes);
        }

        writer.begin().await?;
        for index in &indexes {
            debug!("Dropping index {}.{}", table, index.name);
            if let Err(e) = writer.drop_index(index).await {
                rollback_quietly(writer).await;
                return Err(e);
            }
        }
        writer.commit().await?;

        info!("{}: dropped {} indexes", table, indexes.len());
        Ok(indexes)
    }

    /// Recreate the indexes returned by [`IndexManager::drop`] in one
    /// transaction. Returns how many were restored.
    pub async fn restore<W>(&self, writer: &mut W, indexes: &[IndexDescriptor]) -> Result<usize>
    where
        W: TargetWriter + ?Sized,
    {
        if indexes.is_empty() {
            return Ok(0);
        }

        writer.begin().await?;
        for index in indexes {
            debug!("Restoring index {}.{}", index.table, index.name);
            if let Err(e) = writer.create_index(index).await {
                rollback_quietly(writer).await;
                return Err(e);
            }
        }
        writer.commit().await?;

        info!("{}: restored {} indexes", indexes[0].table, indexes.len());
        Ok(indexes.len())
    }
}

async fn rollback_quietly<W: TargetWriter + ?Sized>(writer: &mut W) {
    if let Err(e) = writer.rollback().await {
        warn!("Rollback failed: {}", e);
    }
}
