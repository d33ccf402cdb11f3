//! The target store seam.
//!
//! [`TargetStore`] is the single collaborator the engine talks to: it exposes
//! the catalog queries used by the schema introspector and the row operations
//! used by the generic writer and the combination builder. Implementations:
//!
//! - [`crate::drivers::mysql::MysqlStore`]: parameterized SQL over `mysql_async`
//! - [`crate::drivers::memory::MemoryStore`]: in-process tables for tests and dry runs
//!
//! # Design Pattern
//!
//! Strategy: the engine works with `Arc<dyn TargetStore>` and never builds SQL
//! itself; statement construction lives in the driver's dialect.

use async_trait::async_trait;

use crate::error::Result;

use super::schema::Column;
use super::value::Row;

/// Schema catalog plus row store of the commerce application's database.
///
/// Filters are equality conjunctions expressed as a [`Row`]; an empty filter
/// selects every row. Catalog methods must not fail for unknown tables: they
/// return empty results instead.
#[async_trait]
pub trait TargetStore: Send + Sync {
    // ===== Catalog =====

    /// Verify the catalog is reachable.
    async fn ping(&self) -> Result<()>;

    /// Check if a table exists.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Columns of a table in ordinal order (empty for unknown tables).
    async fn list_columns(&self, table: &str) -> Result<Vec<Column>>;

    /// Primary key columns in key order (empty for unknown tables).
    async fn list_primary_key(&self, table: &str) -> Result<Vec<String>>;

    // ===== Rows =====

    /// Select `columns` (all columns when empty) from rows matching `filter`.
    async fn select(&self, table: &str, columns: &[String], filter: &Row) -> Result<Vec<Row>>;

    /// Plain INSERT. Returns the generated AUTO_INCREMENT value, if any,
    /// read on the same connection immediately after the insert.
    async fn insert(&self, table: &str, row: &Row) -> Result<Option<i64>>;

    /// Insert, or update the existing row on primary-key conflict.
    ///
    /// Columns named in `fill_only` overwrite an existing value only when it
    /// is NULL or empty; all other non-key columns always overwrite.
    async fn upsert(
        &self,
        table: &str,
        row: &Row,
        pk_cols: &[String],
        fill_only: &[String],
    ) -> Result<u64>;

    /// UPDATE rows matching `filter`. An empty filter is rejected.
    async fn update(&self, table: &str, set: &Row, filter: &Row) -> Result<u64>;

    /// DELETE rows matching `filter`. An empty filter is rejected.
    async fn delete(&self, table: &str, filter: &Row) -> Result<u64>;

    /// Get the store type identifier (e.g., "mysql", "memory").
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}
