//! Generic writer: one guarded write per (table, scope tuple).
//!
//! For every entity of the mapping, primary entity first, the writer resolves
//! the physical table, plans its scope tuples, drafts and finalizes a row per
//! tuple, backfills keys from the run's id cache and then either inserts
//! (capturing the generated surrogate key) or upserts. Nothing that goes
//! wrong for one tuple stops the run: failures become diagnostics.

mod row;

pub use row::{
    draft_fields, finalize, Cell, Finalized, NumericPolicy, RowDraft, ValueSource,
};

use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink, WriteAction};
use crate::config::SyncConfig;
use crate::core::identifier::physical_table;
use crate::core::schema::TableSchema;
use crate::core::traits::TargetStore;
use crate::core::value::Row;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::engine::RunContext;
use crate::error::SyncError;
use crate::mapping::{MappingSpec, TableBinding};
use crate::resolve::Resolver;
use crate::scope::{AxisDefaults, ScopePlanner, ScopeTuple};
use crate::state::{RunState, PARENT_ALIAS};

/// Everything a write needs that does not change during a run.
pub struct WriteEnv<'a> {
    pub store: &'a dyn TargetStore,
    pub audit: &'a dyn AuditSink,
    pub sync: &'a SyncConfig,
    pub ctx: &'a RunContext,
    pub mapping: &'a MappingSpec,
    /// Primary entity name.
    pub primary: &'a str,
    pub defaults: AxisDefaults,
}

/// Where one store call lands, for diagnostics and audit events.
#[derive(Debug, Clone)]
pub struct WriteTarget<'t> {
    pub run_id: Uuid,
    pub table: &'t str,
    /// Rendered scope tuple, empty for unscoped writes.
    pub scope: String,
}

impl<'t> WriteTarget<'t> {
    pub fn new(run_id: Uuid, table: &'t str) -> Self {
        Self {
            run_id,
            table,
            scope: String::new(),
        }
    }

    pub fn at(mut self, tuple: &ScopeTuple) -> Self {
        self.scope = tuple.to_string();
        self
    }
}

impl<'a> WriteEnv<'a> {
    pub fn new(
        store: &'a dyn TargetStore,
        audit: &'a dyn AuditSink,
        sync: &'a SyncConfig,
        ctx: &'a RunContext,
        mapping: &'a MappingSpec,
        primary: &'a str,
    ) -> Self {
        Self {
            store,
            audit,
            sync,
            ctx,
            mapping,
            primary,
            defaults: ctx.axis_defaults(),
        }
    }

    pub fn planner(&self) -> ScopePlanner<'_> {
        ScopePlanner::new(
            &self.sync.axis_columns,
            &self.mapping.settings,
            &self.defaults,
            &self.sync.group_required_tables,
        )
    }

    /// Physical table name of an entity.
    pub fn physical(&self, entity: &str) -> String {
        physical_table(&self.ctx.table_prefix, entity)
    }

    /// The `#.` namespace for one scope tuple.
    pub fn meta(&self, run_id: Uuid, target_id: Option<i64>, tuple: &ScopeTuple) -> Value {
        let mut meta = Map::new();
        meta.insert("now".into(), json!(self.ctx.formatted_now()));
        meta.insert("record_id".into(), json!(self.ctx.record_id));
        meta.insert("run_id".into(), json!(run_id.to_string()));
        meta.insert("target_id".into(), json!(target_id));
        let axes = &self.sync.axis_columns;
        for (column, value) in [
            (&axes.store, tuple.store),
            (&axes.language, tuple.lang),
            (&axes.group, tuple.group),
        ] {
            if let Some(id) = value {
                meta.insert(column.clone(), json!(id));
            }
        }
        Value::Object(meta)
    }

    // ===== Store calls =====

    pub async fn select_rows(
        &self,
        table: &str,
        columns: &[String],
        filter: &Row,
    ) -> Result<Vec<Row>, Diagnostic> {
        self.store
            .select(table, columns, filter)
            .await
            .map_err(|e| failure_diagnostic(table, "", &e))
    }

    pub async fn insert_row(
        &self,
        at: &WriteTarget<'_>,
        row: &Row,
        origins: Option<&IndexMap<String, String>>,
    ) -> Result<Option<i64>, Diagnostic> {
        debug!("INSERT {} ({}) {} column(s)", at.table, at.scope, row.len());
        match self.store.insert(at.table, row).await {
            Ok(id) => {
                self.record_written(at, WriteAction::Inserted, id, row, origins);
                Ok(id)
            }
            Err(e) => Err(self.record_failed(at, &e)),
        }
    }

    pub async fn upsert_row(
        &self,
        at: &WriteTarget<'_>,
        row: &Row,
        pk: &[String],
        fill_only: &[String],
        origins: Option<&IndexMap<String, String>>,
        action: WriteAction,
    ) -> Result<u64, Diagnostic> {
        debug!("UPSERT {} ({}) {} column(s)", at.table, at.scope, row.len());
        match self.store.upsert(at.table, row, pk, fill_only).await {
            Ok(affected) => {
                self.record_written(at, action, None, row, origins);
                Ok(affected)
            }
            Err(e) => Err(self.record_failed(at, &e)),
        }
    }

    pub async fn update_row(
        &self,
        at: &WriteTarget<'_>,
        set: &Row,
        filter: &Row,
        origins: Option<&IndexMap<String, String>>,
    ) -> Result<u64, Diagnostic> {
        debug!("UPDATE {} ({}) {} column(s)", at.table, at.scope, set.len());
        match self.store.update(at.table, set, filter).await {
            Ok(affected) => {
                self.record_written(at, WriteAction::Updated, None, set, origins);
                Ok(affected)
            }
            Err(e) => Err(self.record_failed(at, &e)),
        }
    }

    pub async fn delete_rows(&self, at: &WriteTarget<'_>, filter: &Row) -> Result<u64, Diagnostic> {
        debug!("DELETE {} ({})", at.table, at.scope);
        match self.store.delete(at.table, filter).await {
            Ok(affected) => {
                self.record_written(at, WriteAction::Unlinked, None, &Row::new(), None);
                Ok(affected)
            }
            Err(e) => Err(self.record_failed(at, &e)),
        }
    }

    fn record_written(
        &self,
        at: &WriteTarget<'_>,
        action: WriteAction,
        generated_id: Option<i64>,
        row: &Row,
        origins: Option<&IndexMap<String, String>>,
    ) {
        self.audit.record(AuditEvent::RowWritten {
            run_id: at.run_id,
            table: at.table.to_string(),
            scope: at.scope.clone(),
            action,
            generated_id,
        });
        for (column, value) in row {
            let origin = origins
                .and_then(|o| o.get(column))
                .map(String::as_str)
                .unwrap_or("builder");
            self.audit.record(AuditEvent::FieldWritten {
                run_id: at.run_id,
                table: at.table.to_string(),
                scope: at.scope.clone(),
                column: column.clone(),
                value: value.to_string(),
                origin: origin.to_string(),
            });
        }
    }

    fn record_failed(&self, at: &WriteTarget<'_>, err: &SyncError) -> Diagnostic {
        self.audit.record(AuditEvent::RowFailed {
            run_id: at.run_id,
            table: at.table.to_string(),
            scope: at.scope.clone(),
            category: err.category().to_string(),
            error: err.to_string(),
        });
        failure_diagnostic(at.table, &at.scope, err)
    }
}

fn failure_diagnostic(table: &str, scope: &str, err: &SyncError) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::WriteFailed,
        table,
        format!("{}: {}", err.category(), err),
    )
    .at(scope)
}

/// Write every mapped table, primary entity first.
pub async fn write_tables(env: &WriteEnv<'_>, state: &mut RunState, record: &Value) {
    for entity in env.mapping.ordered_entities(env.primary) {
        if let Some(binding) = env.mapping.tables.get(entity) {
            write_table(env, state, entity, binding, record).await;
        }
    }
}

/// Write one entity across its scope tuples. Returns the number of rows written.
pub async fn write_table(
    env: &WriteEnv<'_>,
    state: &mut RunState,
    entity: &str,
    binding: &TableBinding,
    record: &Value,
) -> usize {
    let physical = env.physical(entity);
    let Some(schema) = state.schema.table(&physical).await else {
        state.diagnostics.push(Diagnostic::new(
            DiagnosticKind::MissingTable,
            &physical,
            format!("table for entity '{}' does not exist", entity),
        ));
        return 0;
    };

    let tuples = match env
        .planner()
        .plan(entity, &schema, &binding.settings, &mut state.languages, env.store)
        .await
    {
        Ok(tuples) => tuples,
        Err(diagnostic) => {
            state.diagnostics.push(diagnostic);
            return 0;
        }
    };

    let is_primary = entity == env.primary;
    let include_defaults = !env.ctx.strict_mapping;
    // Ids generated by this table's own tuples must not turn later tuples
    // into updates of the first row.
    let own_id = state.ids.get(entity);
    let mut written = 0;

    for tuple in &tuples {
        let target_id = state.ids.get(PARENT_ALIAS).or(env.ctx.target_id);
        let meta = env.meta(state.run_id, target_id, tuple);
        let resolver = Resolver::new(record)
            .with_primary(env.primary)
            .with_meta(&meta);

        let mut draft = draft_fields(
            &schema,
            binding,
            &env.mapping.settings.fixed,
            &resolver,
            include_defaults,
        );
        if draft.is_empty() {
            state.diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::NoMappedColumns,
                    &schema.name,
                    "no mapped column resolved",
                )
                .at(tuple),
            );
            continue;
        }

        for (column, id) in tuple.columns(&schema, &env.sync.axis_columns) {
            draft.set(column, Cell::new(id.to_json(), ValueSource::Scope, "scope"));
        }
        backfill_keys(&mut draft, &schema, own_id, state);

        let finalized = finalize(&schema, draft, NumericPolicy::Neutral);
        for note in &finalized.notes {
            state.diagnostics.push(note.clone().at(tuple));
        }

        match write_tuple(env, state, entity, &schema, tuple, &finalized, is_primary).await {
            Ok(()) => written += 1,
            Err(diagnostic) => state.diagnostics.push(diagnostic),
        }
    }

    info!(
        "{}: {} of {} scope tuple(s) written",
        schema.name,
        written,
        tuples.len()
    );
    written
}

/// Fill key columns the draft lacks from the run's id cache.
///
/// A table's own surrogate key comes from `own_id`, the entity's id as it
/// stood before the table's tuple loop (seeded from the run's target id or
/// generated by an earlier binding); any other column is looked up by its
/// exact name.
fn backfill_keys(
    draft: &mut RowDraft,
    schema: &TableSchema,
    own_id: Option<i64>,
    state: &RunState,
) {
    let own_key = schema.surrogate_key().map(|c| c.name.as_str());
    for column in &schema.columns {
        if draft.contains(&column.name) {
            continue;
        }
        let id = if Some(column.name.as_str()) == own_key {
            own_id
        } else {
            state.ids.get(&column.name)
        };
        if let Some(id) = id {
            draft.set(
                column.name.clone(),
                Cell::new(id, ValueSource::Key, "backfill"),
            );
        }
    }
}

async fn write_tuple(
    env: &WriteEnv<'_>,
    state: &mut RunState,
    entity: &str,
    schema: &TableSchema,
    tuple: &ScopeTuple,
    finalized: &Finalized,
    is_primary: bool,
) -> Result<(), Diagnostic> {
    let at = WriteTarget::new(state.run_id, &schema.name).at(tuple);

    if let Some(key) = schema.surrogate_key() {
        if !finalized.row.contains_key(&key.name) {
            let generated = env
                .insert_row(&at, &finalized.row, Some(&finalized.origins))
                .await?;
            if let Some(id) = generated {
                state
                    .ids
                    .record_generated(entity, &key.name, id, is_primary);
                debug!("{}: generated {} = {}", schema.name, key.name, id);
            }
            return Ok(());
        }
    }

    let missing: Vec<&str> = schema
        .primary_key
        .iter()
        .filter(|col| finalized.row.get(*col).map_or(true, |v| v.is_null()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(Diagnostic::new(
            DiagnosticKind::MissingPrimaryKey,
            &schema.name,
            format!("missing key column(s): {}", missing.join(", ")),
        )
        .at(tuple));
    }

    env.upsert_row(
        &at,
        &finalized.row,
        &schema.primary_key,
        &finalized.fill_only,
        Some(&finalized.origins),
        WriteAction::Upserted,
    )
    .await?;
    Ok(())
}
