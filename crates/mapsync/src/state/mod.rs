//! Run-scoped state.
//!
//! A [`RunState`] is created at the start of one synchronization run, threaded
//! by reference through the generic writer and the combination builder, and
//! dropped when the run ends. Nothing in it is shared across runs.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use uuid::Uuid;

use crate::core::traits::TargetStore;
use crate::diagnostics::Diagnostics;
use crate::introspect::SchemaIntrospector;
use crate::scope::ActiveLanguages;

/// Alias under which the primary entity's id is also cached.
pub const PARENT_ALIAS: &str = "parent";

/// Surrogate keys known to the run, for foreign-key backfill.
///
/// Keys are entity names, surrogate column names and [`PARENT_ALIAS`].
#[derive(Debug, Clone, Default)]
pub struct IdCache {
    keys: IndexMap<String, i64>,
    generated: IndexMap<String, i64>,
}

impl IdCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an id that already exists in the store (e.g. a re-run's target).
    pub fn seed(&mut self, entity: &str, id: i64, is_primary: bool) {
        self.keys.insert(entity.to_string(), id);
        if is_primary {
            self.keys.insert(PARENT_ALIAS.to_string(), id);
        }
    }

    /// Register a key the store generated for `entity`'s `column`.
    pub fn record_generated(&mut self, entity: &str, column: &str, id: i64, is_primary: bool) {
        self.keys.insert(entity.to_string(), id);
        self.keys.insert(column.to_string(), id);
        if is_primary {
            self.keys.insert(PARENT_ALIAS.to_string(), id);
        }
        self.generated.insert(entity.to_string(), id);
    }

    /// Register a surrogate column value without marking it generated.
    pub fn remember_column(&mut self, column: &str, id: i64) {
        self.keys.insert(column.to_string(), id);
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.keys.get(key).copied()
    }

    /// Entity name to key for every insert the store generated a key for.
    pub fn generated(&self) -> &IndexMap<String, i64> {
        &self.generated
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.generated.clear();
    }
}

/// Mutable state owned by exactly one run.
pub struct RunState {
    pub run_id: Uuid,
    pub ids: IdCache,
    pub schema: SchemaIntrospector,
    pub languages: ActiveLanguages,
    pub diagnostics: Diagnostics,
    /// Normalized group label to attribute group id.
    pub(crate) groups: HashMap<String, i64>,
    /// (group id, normalized value) to attribute id.
    pub(crate) attributes: HashMap<(i64, String), i64>,
}

impl RunState {
    pub fn new(store: Arc<dyn TargetStore>, languages: ActiveLanguages) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            ids: IdCache::new(),
            schema: SchemaIntrospector::new(store),
            languages,
            diagnostics: Diagnostics::new(),
            groups: HashMap::new(),
            attributes: HashMap::new(),
        }
    }
}
