//! Schema introspection with a per-run cache.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::schema::{Column, TableSchema};
use crate::core::traits::TargetStore;

/// Reads table metadata from the store's catalog, once per table per run.
///
/// Catalog failures are logged and reported as "no such table": callers
/// skip the table with a diagnostic rather than aborting the run. Failed
/// lookups are not cached, so a transient error does not hide a table for
/// the rest of the run.
pub struct SchemaIntrospector {
    store: Arc<dyn TargetStore>,
    cache: HashMap<String, Option<Arc<TableSchema>>>,
}

impl SchemaIntrospector {
    pub fn new(store: Arc<dyn TargetStore>) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    /// Snapshot of a physical table, or `None` when it does not exist.
    pub async fn table(&mut self, name: &str) -> Option<Arc<TableSchema>> {
        if let Some(cached) = self.cache.get(name) {
            return cached.clone();
        }

        let columns = match self.store.list_columns(name).await {
            Ok(columns) => columns,
            Err(e) => {
                warn!("Catalog lookup for {} failed: {}", name, e);
                return None;
            }
        };
        if columns.is_empty() {
            debug!("Table {} not found in catalog", name);
            self.cache.insert(name.to_string(), None);
            return None;
        }

        let primary_key = match self.store.list_primary_key(name).await {
            Ok(pk) => pk,
            Err(e) => {
                warn!("Primary key lookup for {} failed: {}", name, e);
                return None;
            }
        };

        let snapshot = Arc::new(TableSchema {
            name: name.to_string(),
            columns,
            primary_key,
        });
        debug!(
            "Introspected {}: {} columns, pk {:?}",
            name,
            snapshot.columns.len(),
            snapshot.primary_key
        );
        self.cache.insert(name.to_string(), Some(Arc::clone(&snapshot)));
        Some(snapshot)
    }

    pub async fn has_table(&mut self, name: &str) -> bool {
        self.table(name).await.is_some()
    }

    /// Column names in ordinal order; empty for unknown tables.
    pub async fn columns(&mut self, name: &str) -> Vec<String> {
        self.table(name)
            .await
            .map(|t| t.columns.iter().map(|c| c.name.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn primary_key(&mut self, name: &str) -> Vec<String> {
        self.table(name)
            .await
            .map(|t| t.primary_key.clone())
            .unwrap_or_default()
    }

    pub async fn column_meta(&mut self, name: &str, column: &str) -> Option<Column> {
        self.table(name).await.and_then(|t| t.get(column).cloned())
    }

    /// Number of tables looked up so far, found or not.
    pub fn cached_tables(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MemoryStore;

    fn store() -> Arc<MemoryStore> {
        Arc::new(
            MemoryStore::new().with_table(
                TableSchema::new("ps_product_lang")
                    .column(Column::new("id_product", "int"))
                    .column(Column::new("id_lang", "int"))
                    .column(Column::new("name", "varchar").with_max_length(128))
                    .primary_key(["id_product", "id_lang"]),
            ),
        )
    }

    #[tokio::test]
    async fn test_lookups() {
        let mut introspector = SchemaIntrospector::new(store());
        assert!(introspector.has_table("ps_product_lang").await);
        assert_eq!(
            introspector.columns("ps_product_lang").await,
            vec!["id_product", "id_lang", "name"]
        );
        assert_eq!(
            introspector.primary_key("ps_product_lang").await,
            vec!["id_product", "id_lang"]
        );
        assert_eq!(
            introspector
                .column_meta("ps_product_lang", "name")
                .await
                .and_then(|c| c.max_length),
            Some(128)
        );
        assert!(introspector.column_meta("ps_product_lang", "nope").await.is_none());
    }

    #[tokio::test]
    async fn test_missing_table_is_cached() {
        let mut introspector = SchemaIntrospector::new(store());
        assert!(!introspector.has_table("ps_nope").await);
        assert!(introspector.columns("ps_nope").await.is_empty());
        assert_eq!(introspector.cached_tables(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_is_stable_within_a_run() {
        let store = store();
        let mut introspector = SchemaIntrospector::new(store.clone());
        assert!(introspector.has_table("ps_product_lang").await);

        store.add_table(TableSchema::new("ps_product_lang").column(Column::new("other", "int")));
        assert!(introspector.column_meta("ps_product_lang", "name").await.is_some());

        let mut next_run = SchemaIntrospector::new(store);
        assert!(next_run.column_meta("ps_product_lang", "name").await.is_none());
    }

    #[tokio::test]
    async fn test_catalog_failure_degrades_to_missing() {
        let store = store();
        store.set_unreachable(true);
        let mut introspector = SchemaIntrospector::new(store.clone());
        assert!(!introspector.has_table("ps_product_lang").await);
        assert_eq!(introspector.cached_tables(), 0);

        store.set_unreachable(false);
        assert!(introspector.has_table("ps_product_lang").await);
    }
}
