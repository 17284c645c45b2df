//! Paged extraction from the source.

use futures::stream::{self, Stream};
use tracing::debug;

use crate::core::schema::SourceTable;
use crate::core::traits::SourceReader;
use crate::core::value::{Page, PageInfo};
use crate::error::{MigrateError, Result};

/// Lazily read a table in pages of `page_size` rows.
///
/// Page `k` covers rows `[k * page_size, (k + 1) * page_size)` in the
/// reader's stable order. The stream ends at the first empty page rather
/// than at a precomputed row count. It is forward-only: every poll drives
/// the source, and re-reading needs a fresh call.
///
/// The source must not change during the scan; offset pagination skips or
/// repeats rows that move across page boundaries.
pub fn extract<'a, S>(
    source: &'a S,
    table: &'a SourceTable,
    page_size: usize,
) -> impl Stream<Item = Result<Page>> + 'a
where
    S: SourceReader + ?Sized,
{
    stream::try_unfold(0u64, move |number| async move {
        let offset = number * page_size as u64;
        let rows = source.read_page(table, page_size, offset).await?;
        if rows.is_empty() {
            debug!("{}: no more rows after page {}", table.name, number);
            return Ok(None);
        }
        debug!("{}: read page {} ({} rows)", table.name, number, rows.len());
        let page = Page {
            info: PageInfo { number, offset },
            rows,
        };
        Ok::<_, MigrateError>(Some((page, number + 1)))
    })
}
