//! Checks run before and after data moves.

pub mod conformance;
pub mod row_count;

pub use conformance::{ColumnDiff, SchemaDiff, SchemaShape};
pub use row_count::validate_row_counts;
