//! Table, column and index metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::SqlValue;

/// Primary key value of a row, for error and repair reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PkValue {
    /// Integer primary key (covers int, bigint, smallint, tinyint).
    Int(i64),
    /// Any other key, rendered as text.
    String(String),
    /// Composite key, in key column order.
    Composite(Vec<PkValue>),
}

impl fmt::Display for PkValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PkValue::Int(v) => write!(f, "{}", v),
            PkValue::String(v) => f.write_str(v),
            PkValue::Composite(parts) => {
                f.write_str("(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    part.fmt(f)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// A target column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Target type name, used as the cast of the insert placeholder.
    pub sql_type: String,
    /// 1-based ordinal position.
    pub ordinal: i32,
}

/// A target table, introspected after the target DDL is loaded.
///
/// The target is authoritative for column order: every page is projected
/// into this order before it reaches the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
    /// Primary key column names, in key order.
    pub primary_key: Vec<String>,
}

impl TableDescriptor {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == column)
    }

    /// Primary key of a row aligned with this table's columns.
    pub fn primary_key_of(&self, row: &[SqlValue]) -> Option<PkValue> {
        let mut parts: Vec<PkValue> = Vec::with_capacity(self.primary_key.len());
        for name in &self.primary_key {
            let value = self.position(name).and_then(|i| row.get(i))?;
            parts.push(value.to_pk()?);
        }
        match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(PkValue::Composite(parts)),
        }
    }

    /// Position of the single-column primary key, when there is exactly one.
    pub fn sequence_key(&self) -> Option<(usize, &str)> {
        match self.primary_key.as_slice() {
            [only] => self.position(only).map(|i| (i, only.as_str())),
            _ => None,
        }
    }
}

/// How a source column is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Integer { unsigned: bool },
    Decimal,
    Float,
    Double,
    Temporal,
    Binary,
    Text,
}

/// A source column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceColumn {
    pub name: String,
    /// Native data type, lowercase (e.g. `varchar`, `datetime`).
    pub data_type: String,
    pub kind: SourceKind,
}

/// A source table with its columns and primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTable {
    pub name: String,
    pub columns: Vec<SourceColumn>,
    pub primary_key: Vec<String>,
}

impl SourceTable {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Reorder the columns to match `target`.
    ///
    /// Returns `None` if a target column has no source counterpart.
    pub fn project(&self, target: &TableDescriptor) -> Option<SourceTable> {
        let columns = target
            .columns
            .iter()
            .map(|t| self.columns.iter().find(|c| c.name == t.name).cloned())
            .collect::<Option<Vec<_>>>()?;
        Some(SourceTable {
            name: self.name.clone(),
            columns,
            primary_key: self.primary_key.clone(),
        })
    }
}

/// A plain column index on a target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub table: String,
    /// Key columns in index order.
    pub columns: Vec<String>,
    pub is_unique: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableDescriptor {
        TableDescriptor {
            name: "users".into(),
            columns: vec![
                ColumnDescriptor { name: "id".into(), sql_type: "bigint".into(), ordinal: 1 },
                ColumnDescriptor { name: "email".into(), sql_type: "character varying".into(), ordinal: 2 },
                ColumnDescriptor { name: "org_id".into(), sql_type: "integer".into(), ordinal: 3 },
            ],
            primary_key: vec!["id".into()],
        }
    }

    #[test]
    fn test_primary_key_of_single() {
        let row = vec![SqlValue::int(7), SqlValue::text("a@b.c"), SqlValue::int(1)];
        assert_eq!(users().primary_key_of(&row), Some(PkValue::Int(7)));
        assert_eq!(users().sequence_key(), Some((0, "id")));
    }

    #[test]
    fn test_primary_key_of_composite() {
        let mut table = users();
        table.primary_key = vec!["org_id".into(), "email".into()];
        let row = vec![SqlValue::int(7), SqlValue::text("a@b.c"), SqlValue::int(1)];
        let pk = table.primary_key_of(&row).unwrap();
        assert_eq!(pk.to_string(), "(1, a@b.c)");
        assert_eq!(table.sequence_key(), None);
    }

    #[test]
    fn test_primary_key_absent() {
        let mut table = users();
        table.primary_key.clear();
        assert_eq!(table.primary_key_of(&[SqlValue::int(1)]), None);
    }

    #[test]
    fn test_project_follows_target_order() {
        let source = SourceTable {
            name: "users".into(),
            columns: vec![
                SourceColumn { name: "org_id".into(), data_type: "int".into(), kind: SourceKind::Integer { unsigned: false } },
                SourceColumn { name: "email".into(), data_type: "varchar".into(), kind: SourceKind::Text },
                SourceColumn { name: "id".into(), data_type: "bigint".into(), kind: SourceKind::Integer { unsigned: true } },
            ],
            primary_key: vec!["id".into()],
        };
        let projected = source.project(&users()).unwrap();
        assert_eq!(projected.column_names(), vec!["id", "email", "org_id"]);

        let mut narrow = source.clone();
        narrow.columns.pop();
        assert!(narrow.project(&users()).is_none());
    }
}
