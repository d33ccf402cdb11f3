//! In-process target store.
//!
//! [`MemoryStore`] keeps tables as vectors of rows behind a mutex and mimics
//! the MySQL behaviors the engine depends on: AUTO_INCREMENT surrogates,
//! `ON DUPLICATE KEY UPDATE` with fill-only columns, case-insensitive text
//! comparison in filters and rejection of unknown columns. It backs the test
//! suite.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::core::schema::{Column, TableSchema};
use crate::core::traits::TargetStore;
use crate::core::value::{row_matches, Row, SqlValue};
use crate::error::{Result, SyncError};

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    rows: Vec<Row>,
    next_id: i64,
}

impl MemoryTable {
    fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
            next_id: 1,
        }
    }

    fn check_columns<'a>(&self, cols: impl IntoIterator<Item = &'a String>) -> Result<()> {
        for col in cols {
            if !self.schema.has_column(col) {
                return Err(SyncError::write(
                    &self.schema.name,
                    format!("Unknown column '{}'", col),
                ));
            }
        }
        Ok(())
    }

    fn key_of(&self, row: &Row) -> Option<Row> {
        if !self.schema.has_pk() {
            return None;
        }
        Some(
            self.schema
                .primary_key
                .iter()
                .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(SqlValue::Null)))
                .collect(),
        )
    }

    fn find_by_key(&self, key: &Row) -> Option<usize> {
        self.rows.iter().position(|r| row_matches(r, key))
    }

    /// Insert a full row, assigning the surrogate key when absent.
    fn insert(&mut self, row: &Row) -> Result<Option<i64>> {
        self.check_columns(row.keys())?;

        let mut stored: Row = self
            .schema
            .columns
            .iter()
            .map(|c| (c.name.clone(), SqlValue::Null))
            .collect();
        for (col, value) in row {
            stored.insert(col.clone(), value.clone());
        }

        let mut generated = None;
        if let Some(surrogate) = self.schema.surrogate_key().map(|c| c.name.clone()) {
            match stored.get(&surrogate).and_then(SqlValue::as_i64) {
                Some(explicit) if explicit > 0 => {
                    self.next_id = self.next_id.max(explicit + 1);
                }
                _ => {
                    let id = self.next_id;
                    self.next_id += 1;
                    stored.insert(surrogate, SqlValue::Int(id));
                    generated = Some(id);
                }
            }
        }

        if let Some(key) = self.key_of(&stored) {
            if self.find_by_key(&key).is_some() {
                return Err(SyncError::write(
                    &self.schema.name,
                    format!("Duplicate entry for key PRIMARY: {:?}", key),
                ));
            }
        }

        self.rows.push(stored);
        Ok(generated)
    }
}

/// In-memory [`TargetStore`].
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<IndexMap<String, MemoryTable>>,
    failing: Mutex<HashSet<String>>,
    write_attempts: Mutex<HashMap<String, usize>>,
    unreachable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: register a table.
    pub fn with_table(self, schema: TableSchema) -> Self {
        self.add_table(schema);
        self
    }

    /// Register (or replace) a table.
    pub fn add_table(&self, schema: TableSchema) {
        self.lock_tables()
            .insert(schema.name.clone(), MemoryTable::new(schema));
    }

    /// Insert a fixture row directly, bypassing failure toggles and counters.
    pub fn seed(&self, table: &str, row: Row) -> Result<Option<i64>> {
        let mut tables = self.lock_tables();
        let entry = tables
            .get_mut(table)
            .ok_or_else(|| SyncError::write(table, "Table doesn't exist"))?;
        entry.insert(&row)
    }

    /// Snapshot of a table's rows (empty for unknown tables).
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock_tables()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Make every write to `table` fail with a store error.
    pub fn fail_writes_to(&self, table: &str) {
        lock(&self.failing).insert(table.to_string());
    }

    /// Simulate an unreachable catalog.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of insert/upsert/update/delete calls made against `table`.
    pub fn write_attempts(&self, table: &str) -> usize {
        lock(&self.write_attempts).get(table).copied().unwrap_or(0)
    }

    fn lock_tables(&self) -> MutexGuard<'_, IndexMap<String, MemoryTable>> {
        lock(&self.tables)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SyncError::pool("connection refused", "memory store"));
        }
        Ok(())
    }

    fn begin_write(&self, table: &str) -> Result<()> {
        self.check_reachable()?;
        *lock(&self.write_attempts)
            .entry(table.to_string())
            .or_insert(0) += 1;
        if lock(&self.failing).contains(table) {
            return Err(SyncError::write(table, "simulated store failure"));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_fillable(value: Option<&SqlValue>) -> bool {
    match value {
        None | Some(SqlValue::Null) => true,
        Some(SqlValue::Text(s)) => s.is_empty(),
        Some(_) => false,
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.check_reachable()
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        self.check_reachable()?;
        Ok(self.lock_tables().contains_key(table))
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<Column>> {
        self.check_reachable()?;
        Ok(self
            .lock_tables()
            .get(table)
            .map(|t| t.schema.columns.clone())
            .unwrap_or_default())
    }

    async fn list_primary_key(&self, table: &str) -> Result<Vec<String>> {
        self.check_reachable()?;
        Ok(self
            .lock_tables()
            .get(table)
            .map(|t| t.schema.primary_key.clone())
            .unwrap_or_default())
    }

    async fn select(&self, table: &str, columns: &[String], filter: &Row) -> Result<Vec<Row>> {
        self.check_reachable()?;
        let tables = self.lock_tables();
        let Some(entry) = tables.get(table) else {
            return Err(SyncError::write(table, "Table doesn't exist"));
        };
        entry.check_columns(columns.iter().chain(filter.keys()))?;
        Ok(entry
            .rows
            .iter()
            .filter(|r| row_matches(r, filter))
            .map(|r| {
                if columns.is_empty() {
                    r.clone()
                } else {
                    columns
                        .iter()
                        .map(|c| (c.clone(), r.get(c).cloned().unwrap_or(SqlValue::Null)))
                        .collect()
                }
            })
            .collect())
    }

    async fn insert(&self, table: &str, row: &Row) -> Result<Option<i64>> {
        self.begin_write(table)?;
        let mut tables = self.lock_tables();
        let entry = tables
            .get_mut(table)
            .ok_or_else(|| SyncError::write(table, "Table doesn't exist"))?;
        entry.insert(row)
    }

    async fn upsert(
        &self,
        table: &str,
        row: &Row,
        pk_cols: &[String],
        fill_only: &[String],
    ) -> Result<u64> {
        self.begin_write(table)?;
        let mut tables = self.lock_tables();
        let entry = tables
            .get_mut(table)
            .ok_or_else(|| SyncError::write(table, "Table doesn't exist"))?;
        entry.check_columns(row.keys())?;

        let key: Row = pk_cols
            .iter()
            .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(SqlValue::Null)))
            .collect();
        let existing = if pk_cols.is_empty() {
            None
        } else {
            entry.find_by_key(&key)
        };

        let Some(index) = existing else {
            entry.insert(row)?;
            return Ok(1);
        };

        let current = &mut entry.rows[index];
        let mut changed = false;
        for (col, value) in row.iter().filter(|(c, _)| !pk_cols.contains(c)) {
            if fill_only.contains(col) && !is_fillable(current.get(col)) {
                continue;
            }
            if current.get(col) != Some(value) {
                current.insert(col.clone(), value.clone());
                changed = true;
            }
        }
        // MySQL reports 2 for an updated row, 0 when nothing changed
        Ok(if changed { 2 } else { 0 })
    }

    async fn update(&self, table: &str, set: &Row, filter: &Row) -> Result<u64> {
        if filter.is_empty() {
            return Err(SyncError::write(table, "refusing UPDATE without a filter"));
        }
        self.begin_write(table)?;
        let mut tables = self.lock_tables();
        let entry = tables
            .get_mut(table)
            .ok_or_else(|| SyncError::write(table, "Table doesn't exist"))?;
        entry.check_columns(set.keys().chain(filter.keys()))?;

        let mut affected = 0;
        for current in entry.rows.iter_mut().filter(|r| row_matches(r, filter)) {
            for (col, value) in set {
                current.insert(col.clone(), value.clone());
            }
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete(&self, table: &str, filter: &Row) -> Result<u64> {
        if filter.is_empty() {
            return Err(SyncError::write(table, "refusing DELETE without a filter"));
        }
        self.begin_write(table)?;
        let mut tables = self.lock_tables();
        let entry = tables
            .get_mut(table)
            .ok_or_else(|| SyncError::write(table, "Table doesn't exist"))?;
        entry.check_columns(filter.keys())?;

        let before = entry.rows.len();
        entry.rows.retain(|r| !row_matches(r, filter));
        Ok((before - entry.rows.len()) as u64)
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}
