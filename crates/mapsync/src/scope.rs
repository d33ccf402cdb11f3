//! Scope axis planning: which (store, language, group) tuples a table is
//! written for.
//!
//! Values for each axis come from, in order: the table's own settings, the
//! mapping's global settings, the run context defaults and, for languages
//! only, the store's active languages. Axes a table has no column for
//! collapse to a single `None`.

use std::fmt;

use tracing::{debug, warn};

use crate::config::AxisColumns;
use crate::core::identifier::physical_table;
use crate::core::schema::TableSchema;
use crate::core::traits::TargetStore;
use crate::core::value::{row, Row};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::mapping::ScopeSettings;

/// One concrete combination of axis values for a single write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ScopeTuple {
    pub store: Option<i64>,
    pub lang: Option<i64>,
    pub group: Option<i64>,
}

impl fmt::Display for ScopeTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn axis(v: Option<i64>) -> String {
            v.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())
        }
        write!(
            f,
            "shop={} lang={} group={}",
            axis(self.store),
            axis(self.lang),
            axis(self.group)
        )
    }
}

impl ScopeTuple {
    /// Axis columns of `schema` paired with this tuple's values.
    pub fn columns(&self, schema: &TableSchema, axes: &AxisColumns) -> Row {
        [
            (&axes.store, self.store),
            (&axes.language, self.lang),
            (&axes.group, self.group),
        ]
        .into_iter()
        .filter(|(col, _)| schema.has_column(col))
        .filter_map(|(col, value)| value.map(|id| (col.clone(), id)))
        .fold(Row::new(), |mut acc, (col, id)| {
            acc.insert(col, id.into());
            acc
        })
    }
}

/// Run-wide defaults for the three axes (the context layer).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AxisDefaults {
    pub store_ids: Vec<i64>,
    pub language_ids: Vec<i64>,
    pub group_ids: Vec<i64>,
}

/// Lazily loaded, run-cached list of active language ids.
#[derive(Debug)]
pub struct ActiveLanguages {
    table: String,
    id_column: String,
    cached: Option<Vec<i64>>,
}

impl ActiveLanguages {
    pub fn new(prefix: &str, language_table: &str, id_column: &str) -> Self {
        Self {
            table: physical_table(prefix, language_table),
            id_column: id_column.to_string(),
            cached: None,
        }
    }

    /// Pre-populated list, for callers that already know the languages.
    pub fn fixed(ids: Vec<i64>) -> Self {
        Self {
            table: String::new(),
            id_column: String::new(),
            cached: Some(ids),
        }
    }

    /// Active language ids; a failed lookup yields an empty list.
    pub async fn get(&mut self, store: &dyn TargetStore) -> Vec<i64> {
        if let Some(ids) = &self.cached {
            return ids.clone();
        }
        let ids = match store
            .select(
                &self.table,
                std::slice::from_ref(&self.id_column),
                &row([("active", 1)]),
            )
            .await
        {
            Ok(rows) => rows
                .iter()
                .filter_map(|r| r.get(&self.id_column).and_then(|v| v.as_i64()))
                .collect(),
            Err(e) => {
                warn!("Could not load active languages from {}: {}", self.table, e);
                Vec::new()
            }
        };
        debug!("Active languages: {:?}", ids);
        self.cached = Some(ids.clone());
        ids
    }
}

/// Plans scope tuples for tables of one run.
pub struct ScopePlanner<'a> {
    axes: &'a AxisColumns,
    global: &'a ScopeSettings,
    defaults: &'a AxisDefaults,
    group_required: &'a [String],
}

impl<'a> ScopePlanner<'a> {
    pub fn new(
        axes: &'a AxisColumns,
        global: &'a ScopeSettings,
        defaults: &'a AxisDefaults,
        group_required: &'a [String],
    ) -> Self {
        Self {
            axes,
            global,
            defaults,
            group_required,
        }
    }

    /// Cartesian product of the table's axis values: store outer, language
    /// middle, group inner.
    ///
    /// Fails with a `mapping_missing_axis` diagnostic when an axis the table
    /// needs has no values, in which case nothing must be written for it.
    pub async fn plan(
        &self,
        entity: &str,
        schema: &TableSchema,
        settings: &ScopeSettings,
        languages: &mut ActiveLanguages,
        store: &dyn TargetStore,
    ) -> Result<Vec<ScopeTuple>, Diagnostic> {
        let missing = |axis: &str| {
            Diagnostic::new(
                DiagnosticKind::MappingMissingAxis,
                &schema.name,
                format!("no {} ids resolved for entity '{}'", axis, entity),
            )
        };

        let stores: Vec<Option<i64>> = if schema.has_column(&self.axes.store) {
            let ids = first_non_empty(&[
                &settings.store_ids,
                &self.global.store_ids,
                &self.defaults.store_ids,
            ]);
            if ids.is_empty() {
                return Err(missing("store"));
            }
            ids.into_iter().map(Some).collect()
        } else {
            vec![None]
        };

        let langs: Vec<Option<i64>> = if schema.has_column(&self.axes.language) {
            let mut ids = first_non_empty(&[
                &settings.language_ids,
                &self.global.language_ids,
                &self.defaults.language_ids,
            ]);
            if ids.is_empty() {
                ids = languages.get(store).await;
            }
            if ids.is_empty() {
                return Err(missing("language"));
            }
            ids.into_iter().map(Some).collect()
        } else {
            vec![None]
        };

        let groups: Vec<Option<i64>> = if schema.has_column(&self.axes.group) {
            let ids = first_non_empty(&[
                &settings.group_ids,
                &self.global.group_ids,
                &self.defaults.group_ids,
            ]);
            if ids.is_empty() && self.group_required.iter().any(|e| e == entity) {
                return Err(missing("group"));
            }
            if ids.is_empty() {
                vec![None]
            } else {
                ids.into_iter().map(Some).collect()
            }
        } else {
            vec![None]
        };

        let mut tuples = Vec::with_capacity(stores.len() * langs.len() * groups.len());
        for &shop in &stores {
            for &lang in &langs {
                for &group in &groups {
                    tuples.push(ScopeTuple {
                        store: shop,
                        lang,
                        group,
                    });
                }
            }
        }
        Ok(tuples)
    }
}

fn first_non_empty(layers: &[&Vec<i64>]) -> Vec<i64> {
    layers
        .iter()
        .find(|ids| !ids.is_empty())
        .map(|ids| ids.to_vec())
        .unwrap_or_default()
}
