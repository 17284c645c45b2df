//! Source/target schema conformance.
//!
//! Only names are compared: tables, and columns within tables present on
//! both sides. Types, nullability and defaults are not.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{MigrateError, Result};

/// Table name to column names.
pub type SchemaShape = BTreeMap<String, BTreeSet<String>>;

/// Column differences of a table present on both sides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnDiff {
    pub table: String,
    pub only_in_source: Vec<String>,
    pub only_in_target: Vec<String>,
}

/// Every difference between two schema shapes, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDiff {
    pub tables_only_in_source: Vec<String>,
    pub tables_only_in_target: Vec<String>,
    pub columns: Vec<ColumnDiff>,
}

impl SchemaDiff {
    pub fn between(source: &SchemaShape, target: &SchemaShape) -> Self {
        let mut diff = SchemaDiff {
            tables_only_in_source: source
                .keys()
                .filter(|t| !target.contains_key(*t))
                .cloned()
                .collect(),
            tables_only_in_target: target
                .keys()
                .filter(|t| !source.contains_key(*t))
                .cloned()
                .collect(),
            columns: Vec::new(),
        };

        for (table, source_cols) in source {
            let Some(target_cols) = target.get(table) else {
                continue;
            };
            let only_in_source: Vec<String> =
                source_cols.difference(target_cols).cloned().collect();
            let only_in_target: Vec<String> =
                target_cols.difference(source_cols).cloned().collect();
            if !only_in_source.is_empty() || !only_in_target.is_empty() {
                diff.columns.push(ColumnDiff {
                    table: table.clone(),
                    only_in_source,
                    only_in_target,
                });
            }
        }
        diff
    }

    pub fn is_empty(&self) -> bool {
        self.tables_only_in_source.is_empty()
            && self.tables_only_in_target.is_empty()
            && self.columns.is_empty()
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tables_only_in_source.is_empty() {
            writeln!(f, "  tables only in source: {}", self.tables_only_in_source.join(", "))?;
        }
        if !self.tables_only_in_target.is_empty() {
            writeln!(f, "  tables only in target: {}", self.tables_only_in_target.join(", "))?;
        }
        for c in &self.columns {
            if !c.only_in_source.is_empty() {
                writeln!(f, "  {}: columns only in source: {}", c.table, c.only_in_source.join(", "))?;
            }
            if !c.only_in_target.is_empty() {
                writeln!(f, "  {}: columns only in target: {}", c.table, c.only_in_target.join(", "))?;
            }
        }
        Ok(())
    }
}

/// Fail with [`MigrateError::SchemaMismatch`] unless both shapes have the
/// same tables and, per table, the same column names.
pub fn check(source: &SchemaShape, target: &SchemaShape) -> Result<()> {
    let diff = SchemaDiff::between(source, target);
    if diff.is_empty() {
        Ok(())
    } else {
        Err(MigrateError::SchemaMismatch(diff))
    }
}
