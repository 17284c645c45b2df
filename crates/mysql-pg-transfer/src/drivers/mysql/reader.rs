//! MySQL/MariaDB source reader.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Row as _, ValueRef};
use tracing::{debug, info};

use super::dialect;
use crate::config::DatabaseConfig;
use crate::core::identifier::qualify_mysql;
use crate::core::schema::{SourceColumn, SourceKind, SourceTable};
use crate::core::traits::{Engine, SourceReader};
use crate::core::value::{Numeric, Row, SqlValue, Temporal};
use crate::drivers::common::SslMode;
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// The extractor holds one connection at a time; a second serves row counts.
const SOURCE_POOL_SIZE: u32 = 2;

/// MySQL/MariaDB source reader.
pub struct MysqlReader {
    pool: MySqlPool,
    database: String,
}

impl MysqlReader {
    /// Connect to the source environment.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let ssl_mode = SslMode::parse_or(config.ssl_mode.as_deref(), SslMode::Preferred)?;

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port())
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .charset("utf8mb4")
            .ssl_mode(ssl_mode.to_mysql());

        let pool = MySqlPoolOptions::new()
            .max_connections(SOURCE_POOL_SIZE)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::pool(e, "creating MySQL source pool"))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::pool(e, "testing MySQL source connection"))?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host,
            config.port(),
            config.database
        );

        Ok(Self {
            pool,
            database: config.database.clone(),
        })
    }

    async fn load_primary_key(&self, table: &str) -> Result<Vec<String>> {
        let query = r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("COLUMN_NAME").map_err(Into::into))
            .collect()
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn engine(&self) -> Result<Engine> {
        let row: MySqlRow = sqlx::query(
            "SELECT CAST(VERSION() AS CHAR(255)) AS v, CAST(@@version_comment AS CHAR(255)) AS c",
        )
        .fetch_one(&self.pool)
        .await?;
        let version: String = row.try_get("v")?;
        let comment: String = row.try_get("c")?;
        Ok(Engine::from_mysql_version(&version, &comment))
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("TABLE_NAME").map_err(Into::into))
            .collect()
    }

    async fn describe_table(&self, table: &str) -> Result<SourceTable> {
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE,
                CAST(COLUMN_TYPE AS CHAR(255)) AS COLUMN_TYPE
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let data_type: String = row.try_get("DATA_TYPE")?;
            let column_type: String = row.try_get("COLUMN_TYPE")?;
            columns.push(SourceColumn {
                name: row.try_get("COLUMN_NAME")?,
                kind: dialect::classify(&data_type, &column_type),
                data_type: data_type.to_lowercase(),
            });
        }

        Ok(SourceTable {
            name: table.to_string(),
            columns,
            primary_key: self.load_primary_key(table).await?,
        })
    }

    async fn read_page(&self, table: &SourceTable, limit: usize, offset: u64) -> Result<Vec<Row>> {
        let sql = dialect::build_page_query(&self.database, table)?;
        debug!("{}: reading {} rows at offset {}", table.name, limit, offset);

        let rows: Vec<MySqlRow> = sqlx::query(&sql)
            .bind(limit as u64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                table
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, col)| decode(row, i, col.kind))
                    .collect::<Result<Row>>()
            })
            .collect()
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) AS cnt FROM {}",
            qualify_mysql(&self.database, table)?
        );
        let row: MySqlRow = sqlx::query(&sql).fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("cnt")?;
        Ok(count as u64)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Decode column `i` of a row into a tagged value.
fn decode(row: &MySqlRow, i: usize, kind: SourceKind) -> Result<SqlValue> {
    if row.try_get_raw(i)?.is_null() {
        return Ok(SqlValue::Null);
    }

    let value = match kind {
        SourceKind::Integer { unsigned: false } => {
            SqlValue::Numeric(Numeric::Int(row.try_get::<i64, _>(i)?))
        }
        SourceKind::Integer { unsigned: true } => {
            SqlValue::Numeric(Numeric::UInt(row.try_get::<u64, _>(i)?))
        }
        SourceKind::Decimal => {
            SqlValue::Numeric(Numeric::Decimal(row.try_get::<rust_decimal::Decimal, _>(i)?))
        }
        SourceKind::Float => SqlValue::Numeric(Numeric::Float(row.try_get::<f32, _>(i)? as f64)),
        SourceKind::Double => SqlValue::Numeric(Numeric::Float(row.try_get::<f64, _>(i)?)),
        SourceKind::Temporal => SqlValue::Temporal(parse_temporal(&row.try_get::<String, _>(i)?)),
        SourceKind::Binary => SqlValue::Binary(row.try_get_unchecked::<Vec<u8>, _>(i)?),
        // Raw bytes: invalid sequences must reach the repair cascade intact.
        SourceKind::Text => SqlValue::Text(row.try_get_unchecked::<Vec<u8>, _>(i)?),
    };
    Ok(value)
}

/// Parse MySQL's textual temporal forms; anything chrono rejects stays raw.
pub(crate) fn parse_temporal(s: &str) -> Temporal {
    if let Ok(ts) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Temporal::Timestamp(ts);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Temporal::Date(d);
    }
    if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M:%S%.f") {
        return Temporal::Time(t);
    }
    Temporal::Raw(s.to_string())
}
