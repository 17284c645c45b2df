//! MySQL/MariaDB SQL generation for paged reads.

use crate::core::identifier::{qualify_mysql, quote_mysql};
use crate::core::schema::{SourceKind, SourceTable};
use crate::error::Result;

/// Classify a column from `INFORMATION_SCHEMA.COLUMNS`.
///
/// `column_type` is the full type (`int(10) unsigned`), `data_type` the bare
/// name (`int`).
pub fn classify(data_type: &str, column_type: &str) -> SourceKind {
    let unsigned = column_type.to_lowercase().contains("unsigned");
    match data_type.to_lowercase().as_str() {
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
            SourceKind::Integer { unsigned }
        }
        // bit(n) is read as an unsigned integer
        "bit" => SourceKind::Integer { unsigned: true },
        "decimal" | "numeric" => SourceKind::Decimal,
        "float" => SourceKind::Float,
        "double" | "real" => SourceKind::Double,
        "date" | "datetime" | "timestamp" | "time" => SourceKind::Temporal,
        "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" | "geometry"
        | "point" | "linestring" | "polygon" => SourceKind::Binary,
        _ => SourceKind::Text,
    }
}

/// Select expression for one column.
///
/// Integers are widened to 64 bits and temporals are read as text so that
/// zero dates reach the normalizer instead of failing to decode.
pub fn select_expr(name: &str, kind: SourceKind) -> Result<String> {
    let col = quote_mysql(name)?;
    Ok(match kind {
        SourceKind::Integer { unsigned: false } => format!("CAST({} AS SIGNED) AS {}", col, col),
        SourceKind::Integer { unsigned: true } => format!("CAST({} AS UNSIGNED) AS {}", col, col),
        SourceKind::Temporal => format!("CAST({} AS CHAR) AS {}", col, col),
        SourceKind::Decimal
        | SourceKind::Float
        | SourceKind::Double
        | SourceKind::Binary
        | SourceKind::Text => col,
    })
}

/// `SELECT ... FROM db.table [ORDER BY pk] LIMIT ? OFFSET ?`
///
/// Rows are ordered by the primary key when there is one, which is the
/// clustered (natural) order in InnoDB.
pub fn build_page_query(database: &str, table: &SourceTable) -> Result<String> {
    let exprs = table
        .columns
        .iter()
        .map(|c| select_expr(&c.name, c.kind))
        .collect::<Result<Vec<_>>>()?;

    let mut sql = format!(
        "SELECT {} FROM {}",
        exprs.join(", "),
        qualify_mysql(database, &table.name)?
    );

    if !table.primary_key.is_empty() {
        let keys = table
            .primary_key
            .iter()
            .map(|k| quote_mysql(k))
            .collect::<Result<Vec<_>>>()?;
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }

    sql.push_str(" LIMIT ? OFFSET ?");
    Ok(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::SourceColumn;

    #[test]
    fn test_classify() {
        assert_eq!(classify("int", "int(11)"), SourceKind::Integer { unsigned: false });
        assert_eq!(
            classify("bigint", "bigint(20) unsigned"),
            SourceKind::Integer { unsigned: true }
        );
        assert_eq!(classify("DATETIME", "datetime"), SourceKind::Temporal);
        assert_eq!(classify("decimal", "decimal(10,2)"), SourceKind::Decimal);
        assert_eq!(classify("longblob", "longblob"), SourceKind::Binary);
        assert_eq!(classify("enum", "enum('a','b')"), SourceKind::Text);
        assert_eq!(classify("json", "json"), SourceKind::Text);
    }

    #[test]
    fn test_select_expr() {
        assert_eq!(
            select_expr("last_login", SourceKind::Temporal).unwrap(),
            "CAST(`last_login` AS CHAR) AS `last_login`"
        );
        assert_eq!(
            select_expr("id", SourceKind::Integer { unsigned: true }).unwrap(),
            "CAST(`id` AS UNSIGNED) AS `id`"
        );
        assert_eq!(select_expr("name", SourceKind::Text).unwrap(), "`name`");
    }

    #[test]
    fn test_page_query_orders_by_primary_key() {
        let table = SourceTable {
            name: "users".into(),
            columns: vec![
                SourceColumn { name: "id".into(), data_type: "int".into(), kind: SourceKind::Integer { unsigned: false } },
                SourceColumn { name: "email".into(), data_type: "varchar".into(), kind: SourceKind::Text },
            ],
            primary_key: vec!["id".into()],
        };
        assert_eq!(
            build_page_query("legacy", &table).unwrap(),
            "SELECT CAST(`id` AS SIGNED) AS `id`, `email` FROM `legacy`.`users` ORDER BY `id` LIMIT ? OFFSET ?"
        );
    }

    #[test]
    fn test_page_query_without_primary_key() {
        let table = SourceTable {
            name: "audit_log".into(),
            columns: vec![SourceColumn { name: "message".into(), data_type: "text".into(), kind: SourceKind::Text }],
            primary_key: vec![],
        };
        let sql = build_page_query("legacy", &table).unwrap();
        assert!(!sql.contains("ORDER BY"));
        assert!(sql.ends_with("LIMIT ? OFFSET ?"));
    }
}
