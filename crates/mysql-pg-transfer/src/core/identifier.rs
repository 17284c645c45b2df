//! Identifier validation and quoting.
//!
//! Table, column and index names come from catalog queries and end up spliced
//! into DDL and DML, since identifiers cannot be bound as parameters. Every
//! name goes through validation and dialect quoting first.

use crate::error::{MigrateError, Result};

/// MySQL allows 64 characters, PostgreSQL 63 bytes.
const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Reject empty names, names with NUL bytes and over-long names.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config("Identifier cannot be empty".to_string()));
    }
    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds {} bytes: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }
    Ok(())
}

/// Quote a PostgreSQL identifier with double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier with backticks.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// `"schema"."table"`
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// `` `database`.`table` ``
pub fn qualify_mysql(database: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mysql(database)?, quote_mysql(table)?))
}

/// Quote and comma-join a list of PostgreSQL column names.
pub fn quote_pg_list(names: &[String]) -> Result<String> {
    let quoted = names
        .iter()
        .map(|n| quote_pg(n))
        .collect::<Result<Vec<_>>>()?;
    Ok(quoted.join(", "))
}
