//! PostgreSQL target session.
//!
//! One pooled connection is checked out for the whole run. Inserts go through
//! a per-table prepared statement whose parameters are all `text`, cast to the
//! column type in SQL (`$1::integer`), so every tagged value only needs a
//! textual rendering.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Config as PgConfig, Statement};
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::core::identifier::{qualify_pg, quote_pg, quote_pg_list};
use crate::core::schema::{ColumnDescriptor, IndexDescriptor, TableDescriptor};
use crate::core::traits::{Engine, InsertOutcome, TargetWriter};
use crate::core::value::SqlValue;
use crate::drivers::common::{SslMode, TlsBuilder};
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// The whole run shares one session.
const TARGET_POOL_SIZE: usize = 1;

struct PreparedInsert {
    table: String,
    statement: Statement,
    params: usize,
}

/// PostgreSQL target session.
pub struct PgWriter {
    pool: Pool,
    client: Object,
    schema: String,
    in_transaction: bool,
    insert: Option<PreparedInsert>,
}

impl PgWriter {
    /// Connect to the target environment and check out the session.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port());
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.application_name("mysql-pg-transfer");
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let ssl_mode = SslMode::parse_or(config.ssl_mode.as_deref(), SslMode::Require)?;
        let pool = match TlsBuilder::new(ssl_mode).build()? {
            None => {
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(TARGET_POOL_SIZE)
                    .build()
                    .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?
            }
            Some(tls) => {
                let mgr = Manager::from_config(pg_config, tls, mgr_config);
                Pool::builder(mgr)
                    .max_size(TARGET_POOL_SIZE)
                    .build()
                    .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?
            }
        };

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "connecting to PostgreSQL target"))?;
        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{} (schema {})",
            config.host,
            config.port(),
            config.database,
            config.schema()
        );

        Ok(Self {
            pool,
            client,
            schema: config.schema().to_string(),
            in_transaction: false,
            insert: None,
        })
    }

    fn qualify(&self, table: &str) -> Result<String> {
        qualify_pg(&self.schema, table)
    }

    async fn load_primary_key(&self, table: &str) -> Result<Vec<String>> {
        let query = r#"
            SELECT a.attname::text
            FROM pg_index i
            JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
            WHERE i.indrelid = $1::text::regclass AND i.indisprimary
            ORDER BY array_position(i.indkey::int2[], a.attnum)
        "#;
        let rows = self.client.query(query, &[&self.qualify(table)?]).await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }
}

#[async_trait]
impl TargetWriter for PgWriter {
    async fn engine(&mut self) -> Result<Engine> {
        let row = self.client.query_one("SELECT version()", &[]).await?;
        let version: String = row.get(0);
        Ok(Engine::from_pg_version(&version))
    }

    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let rows = self
            .client
            .query(
                "SELECT tablename::text FROM pg_tables WHERE schemaname = $1 ORDER BY tablename",
                &[&self.schema],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get(0)).collect())
    }

    async fn describe_table(&mut self, table: &str) -> Result<TableDescriptor> {
        let query = r#"
            SELECT a.attname::text, format_type(a.atttypid, NULL), a.attnum::int4
            FROM pg_attribute a
            JOIN pg_class c ON c.oid = a.attrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relname = $2 AND a.attnum > 0 AND NOT a.attisdropped
            ORDER BY a.attnum
        "#;
        let rows = self.client.query(query, &[&self.schema, &table]).await?;

        let columns = rows
            .iter()
            .map(|r| ColumnDescriptor {
                name: r.get(0),
                sql_type: r.get(1),
                ordinal: r.get(2),
            })
            .collect();

        Ok(TableDescriptor {
            name: table.to_string(),
            columns,
            primary_key: self.load_primary_key(table).await?,
        })
    }

    async fn list_indexes(&mut self, table: &str) -> Result<Vec<IndexDescriptor>> {
        // Plain btree column indexes only; primary keys, constraint-backed,
        // expression and partial indexes stay in place.
        let query = r#"
            SELECT ic.relname::text,
                   ix.indisunique,
                   array_agg(a.attname::text ORDER BY k.ord)
            FROM pg_index ix
            JOIN pg_class t ON t.oid = ix.indrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_class ic ON ic.oid = ix.indexrelid
            JOIN pg_am am ON am.oid = ic.relam
            CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
            WHERE n.nspname = $1 AND t.relname = $2
              AND NOT ix.indisprimary
              AND ix.indexprs IS NULL
              AND ix.indpred IS NULL
              AND am.amname = 'btree'
              AND k.ord <= ix.indnkeyatts
              AND NOT EXISTS (SELECT 1 FROM pg_constraint con WHERE con.conindid = ix.indexrelid)
            GROUP BY ic.relname, ix.indisunique
            ORDER BY ic.relname
        "#;
        let rows = self.client.query(query, &[&self.schema, &table]).await?;

        Ok(rows
            .iter()
            .map(|r| IndexDescriptor {
                name: r.get(0),
                table: table.to_string(),
                is_unique: r.get(1),
                columns: r.get(2),
            })
            .collect())
    }

    async fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(MigrateError::Internal(
                "BEGIN on target session: a transaction is already open".into(),
            ));
        }
        self.client.batch_execute("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.in_transaction = false;
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn prepare_insert(&mut self, table: &TableDescriptor) -> Result<()> {
        let sql = build_insert_sql(&self.schema, table)?;
        debug!("Preparing insert for {}: {}", table.name, sql);
        let types = vec![Type::TEXT; table.columns.len()];
        let statement = self.client.prepare_typed(&sql, &types).await?;
        self.insert = Some(PreparedInsert {
            table: table.name.clone(),
            statement,
            params: table.columns.len(),
        });
        Ok(())
    }

    async fn insert_row(&mut self, row: &[SqlValue]) -> Result<InsertOutcome> {
        let prepared = self.insert.as_ref().ok_or_else(|| {
            MigrateError::Internal("inserting row: no prepared insert statement".into())
        })?;
        if row.len() != prepared.params {
            return Err(MigrateError::Internal(format!(
                "inserting row: row has {} values, {} expects {}",
                row.len(),
                prepared.table,
                prepared.params
            )));
        }

        let mut values: Vec<Option<String>> = Vec::with_capacity(row.len());
        for value in row {
            match render(value) {
                Ok(v) => values.push(v),
                Err(reason) => return Ok(InsertOutcome::Rejected(reason)),
            }
        }
        let params: Vec<&(dyn ToSql + Sync)> =
            values.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        match self.client.execute(&prepared.statement, &params).await {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) => match e.as_db_error() {
                Some(db) => Ok(InsertOutcome::Rejected(format!(
                    "{} ({})",
                    db.message(),
                    db.code().code()
                ))),
                None => Err(e.into()),
            },
        }
    }

    async fn drop_index(&mut self, index: &IndexDescriptor) -> Result<()> {
        let sql = format!("DROP INDEX {}", qualify_pg(&self.schema, &index.name)?);
        self.client.batch_execute(&sql).await?;
        Ok(())
    }

    async fn create_index(&mut self, index: &IndexDescriptor) -> Result<()> {
        let sql = build_create_index_sql(&self.schema, index)?;
        self.client.batch_execute(&sql).await?;
        Ok(())
    }

    async fn set_triggers_enabled(&mut self, table: &str, enabled: bool) -> Result<()> {
        let sql = format!(
            "ALTER TABLE {} {} TRIGGER ALL",
            self.qualify(table)?,
            if enabled { "ENABLE" } else { "DISABLE" }
        );
        self.client.batch_execute(&sql).await?;
        Ok(())
    }

    async fn reset_sequence(&mut self, table: &str, column: &str, max_key: i64) -> Result<()> {
        // No-op when the column has no owned sequence: setval(NULL) is NULL.
        self.client
            .query_one(
                "SELECT setval(pg_get_serial_sequence($1, $2), $3, true)",
                &[&self.qualify(table)?, &column, &max_key],
            )
            .await?;
        Ok(())
    }

    async fn truncate_tables(&mut self, tables: &[String]) -> Result<()> {
        if tables.is_empty() {
            return Ok(());
        }
        let qualified = tables
            .iter()
            .map(|t| self.qualify(t))
            .collect::<Result<Vec<_>>>()?;
        self.client
            .batch_execute(&format!("TRUNCATE TABLE {}", qualified.join(", ")))
            .await?;
        Ok(())
    }

    async fn row_count(&mut self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.qualify(table)?);
        let row = self.client.query_one(&sql, &[]).await?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    async fn close(&mut self) {
        self.insert = None;
        self.pool.close();
    }
}

/// `INSERT INTO "s"."t" ("a", "b") VALUES ($1::integer, $2::text)`
fn build_insert_sql(schema: &str, table: &TableDescriptor) -> Result<String> {
    let placeholders = table
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("${}::{}", i + 1, c.sql_type))
        .collect::<Vec<_>>();
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualify_pg(schema, &table.name)?,
        quote_pg_list(&table.column_names())?,
        placeholders.join(", ")
    ))
}

fn build_create_index_sql(schema: &str, index: &IndexDescriptor) -> Result<String> {
    Ok(format!(
        "CREATE {}INDEX {} ON {} ({})",
        if index.is_unique { "UNIQUE " } else { "" },
        quote_pg(&index.name)?,
        qualify_pg(schema, &index.table)?,
        quote_pg_list(&index.columns)?
    ))
}

/// Text form of a value for a `text` parameter.
///
/// Text that is not valid UTF-8 cannot be sent at all, so it is rejected the
/// same way the server rejects invalid byte sequences.
fn render(value: &SqlValue) -> std::result::Result<Option<String>, String> {
    match value {
        SqlValue::Null => Ok(None),
        SqlValue::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => Ok(Some(s.to_string())),
            Err(e) => Err(format!(
                "invalid byte sequence for encoding \"UTF8\" at byte {}",
                e.valid_up_to()
            )),
        },
        SqlValue::Binary(bytes) => {
            let mut hex = String::with_capacity(2 + bytes.len() * 2);
            hex.push_str("\\x");
            for b in bytes {
                let _ = write!(hex, "{:02x}", b);
            }
            Ok(Some(hex))
        }
        SqlValue::Temporal(t) => Ok(Some(t.to_string())),
        SqlValue::Numeric(n) => Ok(Some(n.to_string())),
    }
}
