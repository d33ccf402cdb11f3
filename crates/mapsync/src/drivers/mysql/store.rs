//! MySQL/MariaDB target store.
//!
//! Implements [`TargetStore`] over a `mysql_async` connection pool. Catalog
//! lookups read `INFORMATION_SCHEMA` for the configured database; row
//! operations run the statements built by [`MysqlDialect`] with every value
//! bound as a parameter.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Timelike};
use mysql_async::prelude::*;
use mysql_async::{Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, SslOpts};
use tracing::{debug, info, warn};

use super::MysqlDialect;
use crate::config::TargetConfig;
use crate::core::schema::Column;
use crate::core::traits::TargetStore;
use crate::core::value::{Row, SqlValue};
use crate::error::{Result, SyncError};

/// MySQL target store using mysql_async.
pub struct MysqlStore {
    pool: Pool,
    database: String,
    dialect: MysqlDialect,
}

impl MysqlStore {
    /// Create a pool from configuration and verify one connection.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        let ssl_opts = match config.ssl_mode.to_lowercase().as_str() {
            "disable" => {
                warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
                None
            }
            "prefer" | "require" => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
            "verify-ca" | "verify_ca" | "verify-full" | "verify_identity" => {
                Some(SslOpts::default())
            }
            _ => {
                warn!(
                    "Unknown ssl_mode '{}', defaulting to Preferred",
                    config.ssl_mode
                );
                Some(SslOpts::default().with_danger_accept_invalid_certs(true))
            }
        };

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .db_name(Some(config.database.clone()))
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            // Use utf8mb4 for full Unicode support
            .init(vec!["SET NAMES utf8mb4"]);

        if let Some(ssl) = ssl_opts {
            builder = builder.ssl_opts(ssl);
        }

        let constraints = PoolConstraints::new(1, config.max_connections.max(1)).ok_or_else(|| {
            SyncError::Config(format!(
                "invalid max_connections: {}",
                config.max_connections
            ))
        })?;
        let opts: Opts = builder
            .pool_opts(PoolOpts::new().with_constraints(constraints))
            .into();

        let store = Self {
            pool: Pool::new(opts),
            database: config.database.clone(),
            dialect: MysqlDialect::new(),
        };
        store.ping().await?;

        info!(
            "Connected to MySQL target: {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(store)
    }

    /// Get a clone of the underlying connection pool.
    pub fn pool(&self) -> Pool {
        self.pool.clone()
    }

    async fn conn(&self, context: &str) -> Result<mysql_async::Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| SyncError::pool(e, context))
    }
}

#[async_trait]
impl TargetStore for MysqlStore {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn("testing MySQL connection").await?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| SyncError::pool(e, "testing MySQL connection"))?;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let mut conn = self.conn("getting MySQL connection").await?;
        let sql = r#"
            SELECT COUNT(*) AS cnt FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
        "#;
        let count: Option<i64> = conn
            .exec_first(sql, (self.database.as_str(), table))
            .await
            .map_err(|e| SyncError::pool(e, "checking table existence"))?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<Column>> {
        let mut conn = self.conn("getting MySQL connection").await?;
        // CAST to CHAR/SIGNED to avoid collation and unsigned type differences
        let sql = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(COLUMN_TYPE AS CHAR(255)) AS COLUMN_TYPE,
                CAST(CASE
                    WHEN CHARACTER_MAXIMUM_LENGTH IS NULL THEN 0
                    WHEN CHARACTER_MAXIMUM_LENGTH > 2147483647 THEN 0
                    ELSE CHARACTER_MAXIMUM_LENGTH
                END AS SIGNED) AS max_length,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
                IF(EXTRA LIKE '%auto_increment%', 1, 0) AS is_identity
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;
        let rows: Vec<(String, String, i64, i64, i64)> = conn
            .exec(sql, (self.database.as_str(), table))
            .await
            .map_err(|e| SyncError::pool(e, "loading MySQL columns"))?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, max_length, is_nullable, is_identity)| Column {
                name,
                data_type,
                max_length: u32::try_from(max_length).ok().filter(|len| *len > 0),
                is_nullable: is_nullable == 1,
                is_auto_increment: is_identity == 1,
            })
            .collect())
    }

    async fn list_primary_key(&self, table: &str) -> Result<Vec<String>> {
        let mut conn = self.conn("getting MySQL connection").await?;
        let sql = r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;
        conn.exec(sql, (self.database.as_str(), table))
            .await
            .map_err(|e| SyncError::pool(e, "loading MySQL primary key"))
    }

    async fn select(&self, table: &str, columns: &[String], filter: &Row) -> Result<Vec<Row>> {
        let filter_cols: Vec<String> = filter.keys().cloned().collect();
        let sql = self.dialect.build_select(table, columns, &filter_cols)?;
        let params: Vec<mysql_async::Value> = filter.values().map(to_mysql_value).collect();

        let mut conn = self.conn("getting MySQL connection").await?;
        let rows: Vec<mysql_async::Row> = conn.exec(&sql, params).await?;
        Ok(rows.into_iter().map(from_mysql_row).collect())
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<Option<i64>> {
        let cols: Vec<String> = row.keys().cloned().collect();
        let sql = self.dialect.build_insert(table, &cols)?;
        let params: Vec<mysql_async::Value> = row.values().map(to_mysql_value).collect();

        let mut conn = self.conn("getting MySQL connection").await?;
        conn.exec_drop(&sql, params).await?;
        // Read on the same connection the insert ran on
        let id = conn.last_insert_id().and_then(|id| i64::try_from(id).ok());
        debug!("MySQL: inserted into {} (id {:?})", table, id);
        Ok(id)
    }

    async fn upsert(
        &self,
        table: &str,
        row: &Row,
        pk_cols: &[String],
        fill_only: &[String],
    ) -> Result<u64> {
        let cols: Vec<String> = row.keys().cloned().collect();
        let sql = self.dialect.build_upsert(table, &cols, pk_cols, fill_only)?;
        let params: Vec<mysql_async::Value> = row.values().map(to_mysql_value).collect();

        let mut conn = self.conn("getting MySQL connection").await?;
        conn.exec_drop(&sql, params).await?;
        let affected = conn.affected_rows();
        debug!("MySQL: upserted into {} ({} affected)", table, affected);
        Ok(affected)
    }

    async fn update(&self, table: &str, set: &Row, filter: &Row) -> Result<u64> {
        if filter.is_empty() {
            return Err(SyncError::write(table, "refusing UPDATE without a filter"));
        }
        if set.is_empty() {
            return Ok(0);
        }
        let set_cols: Vec<String> = set.keys().cloned().collect();
        let filter_cols: Vec<String> = filter.keys().cloned().collect();
        let sql = self.dialect.build_update(table, &set_cols, &filter_cols)?;
        let params: Vec<mysql_async::Value> = set
            .values()
            .chain(filter.values())
            .map(to_mysql_value)
            .collect();

        let mut conn = self.conn("getting MySQL connection").await?;
        conn.exec_drop(&sql, params).await?;
        Ok(conn.affected_rows())
    }

    async fn delete(&self, table: &str, filter: &Row) -> Result<u64> {
        if filter.is_empty() {
            return Err(SyncError::write(table, "refusing DELETE without a filter"));
        }
        let filter_cols: Vec<String> = filter.keys().cloned().collect();
        let sql = self.dialect.build_delete(table, &filter_cols)?;
        let params: Vec<mysql_async::Value> = filter.values().map(to_mysql_value).collect();

        let mut conn = self.conn("getting MySQL connection").await?;
        conn.exec_drop(&sql, params).await?;
        Ok(conn.affected_rows())
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.clone().disconnect().await.ok();
    }
}

/// Convert SqlValue to a mysql_async parameter.
fn to_mysql_value(value: &SqlValue) -> mysql_async::Value {
    match value {
        SqlValue::Null => mysql_async::Value::NULL,
        SqlValue::Bool(b) => mysql_async::Value::from(*b),
        SqlValue::Int(i) => mysql_async::Value::from(*i),
        SqlValue::Float(f) => mysql_async::Value::from(*f),
        SqlValue::Decimal(d) => mysql_async::Value::from(d.to_string()),
        SqlValue::Text(s) => mysql_async::Value::from(s.as_str()),
        SqlValue::DateTime(dt) => mysql_async::Value::Date(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            dt.nanosecond() / 1_000,
        ),
        SqlValue::Date(d) => {
            mysql_async::Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0)
        }
    }
}

/// Convert a mysql_async value read back from a result set.
fn from_mysql_value(value: mysql_async::Value) -> SqlValue {
    use mysql_async::Value as V;
    match value {
        V::NULL => SqlValue::Null,
        V::Bytes(bytes) => SqlValue::Text(String::from_utf8_lossy(&bytes).into_owned()),
        V::Int(i) => SqlValue::Int(i),
        V::UInt(u) => i64::try_from(u)
            .map(SqlValue::Int)
            .unwrap_or_else(|_| SqlValue::Text(u.to_string())),
        V::Float(f) => SqlValue::Float(f64::from(f)),
        V::Double(d) => SqlValue::Float(d),
        V::Date(y, m, d, h, mi, s, us) => {
            NaiveDate::from_ymd_opt(i32::from(y), u32::from(m), u32::from(d))
                .and_then(|date| {
                    date.and_hms_micro_opt(u32::from(h), u32::from(mi), u32::from(s), us)
                })
                .map(SqlValue::DateTime)
                .unwrap_or(SqlValue::Null)
        }
        V::Time(neg, days, h, m, s, us) => SqlValue::Text(format!(
            "{}{:02}:{:02}:{:02}.{:06}",
            if neg { "-" } else { "" },
            u32::from(h) + days * 24,
            m,
            s,
            us
        )),
    }
}

fn from_mysql_row(mut row: mysql_async::Row) -> Row {
    let names: Vec<String> = row
        .columns_ref()
        .iter()
        .map(|c| c.name_str().into_owned())
        .collect();
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let value = row
                .take::<mysql_async::Value, usize>(i)
                .map(from_mysql_value)
                .unwrap_or(SqlValue::Null);
            (name, value)
        })
        .collect()
}
