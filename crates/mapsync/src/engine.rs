//! Sync engine - runs one mapping against one source record.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink, TracingAuditSink};
use crate::config::{Config, SyncConfig};
use crate::core::identifier::physical_table;
use crate::core::traits::TargetStore;
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::error::{Result, SyncError};
use crate::mapping::MappingSpec;
use crate::media::{MediaIngest, MediaRequest, MediaSummary};
use crate::scope::{ActiveLanguages, AxisDefaults};
use crate::state::{RunState, PARENT_ALIAS};
use crate::variants::{CombinationBuilder, VariantOutcome};
use crate::writer::{write_tables, WriteEnv};

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Caller-supplied inputs of one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Identifier of the source record. Required.
    pub record_id: String,

    /// Existing primary-entity id; re-runs update this row instead of inserting.
    pub target_id: Option<i64>,

    pub store_ids: Vec<i64>,
    pub language_ids: Vec<i64>,
    pub group_ids: Vec<i64>,

    /// Prefix turning entity names into physical table names.
    pub table_prefix: String,

    /// Timestamp exposed as `#.now`.
    pub now: NaiveDateTime,

    /// chrono format for `#.now`.
    pub date_format: String,

    /// Skip default-sourced fields.
    pub strict_mapping: bool,
}

impl RunContext {
    pub fn new(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            target_id: None,
            store_ids: Vec::new(),
            language_ids: Vec::new(),
            group_ids: Vec::new(),
            table_prefix: "ps_".to_string(),
            now: Local::now().naive_local(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            strict_mapping: false,
        }
    }

    /// Context carrying the configured defaults.
    pub fn from_config(config: &Config, record_id: impl Into<String>) -> Self {
        let sync = &config.sync;
        Self {
            store_ids: sync.store_ids.clone(),
            language_ids: sync.language_ids.clone(),
            group_ids: sync.group_ids.clone(),
            table_prefix: config.target.table_prefix.clone(),
            date_format: sync.date_format.clone(),
            strict_mapping: sync.strict_mapping,
            ..Self::new(record_id)
        }
    }

    pub fn with_target_id(mut self, id: Option<i64>) -> Self {
        self.target_id = id;
        self
    }

    pub fn with_store_ids(mut self, ids: Vec<i64>) -> Self {
        self.store_ids = ids;
        self
    }

    pub fn with_language_ids(mut self, ids: Vec<i64>) -> Self {
        self.language_ids = ids;
        self
    }

    pub fn with_group_ids(mut self, ids: Vec<i64>) -> Self {
        self.group_ids = ids;
        self
    }

    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    pub fn with_now(mut self, now: NaiveDateTime) -> Self {
        self.now = now;
        self
    }

    pub fn with_strict_mapping(mut self, strict: bool) -> Self {
        self.strict_mapping = strict;
        self
    }

    /// `now` in the run's date format; an invalid format falls back to
    /// `%Y-%m-%d %H:%M:%S`.
    pub fn formatted_now(&self) -> String {
        let mut out = String::new();
        if write!(out, "{}", self.now.format(&self.date_format)).is_err() {
            return self.now.format(DEFAULT_DATE_FORMAT).to_string();
        }
        out
    }

    pub fn axis_defaults(&self) -> AxisDefaults {
        AxisDefaults {
            store_ids: self.store_ids.clone(),
            language_ids: self.language_ids.clone(),
            group_ids: self.group_ids.clone(),
        }
    }
}

/// Result of a sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    /// Unique run identifier.
    pub run_id: Uuid,

    pub record_id: String,

    /// Keys generated by inserts, by entity name.
    pub generated_ids: IndexMap<String, i64>,

    /// Combination made default for the product, if any.
    pub default_combination_id: Option<i64>,

    /// Everything that was skipped, coerced or failed.
    pub diagnostics: Vec<Diagnostic>,

    /// Per-variant outcomes.
    pub variants: Vec<VariantOutcome>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaSummary>,

    pub started_at: DateTime<Utc>,

    pub duration_ms: u64,
}

impl SyncResult {
    /// Diagnostics of one kind.
    pub fn of_kind(&self, kind: DiagnosticKind) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| d.kind == kind).collect()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs mappings against one target store.
///
/// The engine holds no per-run state, so one instance can serve concurrent
/// runs from an `Arc`.
pub struct SyncEngine {
    store: Arc<dyn TargetStore>,
    sync: SyncConfig,
    audit: Arc<dyn AuditSink>,
    media: Option<Arc<dyn MediaIngest>>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn TargetStore>, sync: SyncConfig) -> Self {
        Self {
            store,
            sync,
            audit: Arc::new(TracingAuditSink),
            media: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_media(mut self, media: Arc<dyn MediaIngest>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn store(&self) -> &Arc<dyn TargetStore> {
        &self.store
    }

    /// Run one synchronization.
    ///
    /// Fails only when the record id is blank or the store cannot be reached;
    /// everything else ends up in [`SyncResult::diagnostics`].
    pub async fn run(
        &self,
        mapping: &MappingSpec,
        record: &Value,
        ctx: &RunContext,
    ) -> Result<SyncResult> {
        let started_at = Utc::now();
        let started = Instant::now();

        if ctx.record_id.trim().is_empty() {
            return Err(SyncError::MissingRecordId);
        }
        self.store
            .ping()
            .await
            .map_err(|e| SyncError::SchemaUnavailable(e.to_string()))?;

        let primary = mapping
            .primary
            .as_deref()
            .unwrap_or(&self.sync.primary_entity);
        let languages = ActiveLanguages::new(
            &ctx.table_prefix,
            &self.sync.language_table,
            &self.sync.axis_columns.language,
        );
        let mut state = RunState::new(self.store.clone(), languages);
        info!(
            "Starting sync run {} for record {}",
            state.run_id, ctx.record_id
        );

        if let Some(id) = ctx.target_id {
            self.seed_target(&mut state, ctx, primary, id).await;
        }

        let env = WriteEnv::new(
            self.store.as_ref(),
            self.audit.as_ref(),
            &self.sync,
            ctx,
            mapping,
            primary,
        );
        write_tables(&env, &mut state, record).await;

        let mut default_combination_id = None;
        let mut variants = Vec::new();
        if let Some(spec) = &mapping.variants {
            match state.ids.get(primary).or_else(|| state.ids.get(PARENT_ALIAS)) {
                Some(product_id) => {
                    let report = CombinationBuilder::new(&env, spec, record, product_id)
                        .build(&mut state)
                        .await;
                    default_combination_id = report.default_combination_id;
                    variants = report.outcomes;
                }
                None => state.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::VariantFailed,
                    env.physical(primary),
                    format!("no '{}' id available, combinations skipped", primary),
                )),
            }
        }

        let target_id = state.ids.get(primary).or(ctx.target_id);
        let media = match &self.media {
            Some(media) => {
                let request = MediaRequest {
                    record_id: &ctx.record_id,
                    target_id,
                    record,
                };
                match media.ingest(request).await {
                    Ok(summary) => {
                        debug!(
                            "Media: {} processed, {} skipped, {} failed",
                            summary.processed, summary.skipped, summary.failed
                        );
                        Some(summary)
                    }
                    Err(e) => {
                        state.diagnostics.push(Diagnostic::new(
                            DiagnosticKind::MediaFailed,
                            env.physical(primary),
                            e.to_string(),
                        ));
                        None
                    }
                }
            }
            None => None,
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.audit.record(AuditEvent::RunFinished {
            run_id: state.run_id,
            record_id: ctx.record_id.clone(),
            diagnostics: state.diagnostics.len(),
            duration_ms,
        });
        info!(
            "Sync run {} finished in {} ms: {} generated id(s), {} diagnostic(s)",
            state.run_id,
            duration_ms,
            state.ids.generated().len(),
            state.diagnostics.len()
        );

        Ok(SyncResult {
            run_id: state.run_id,
            record_id: ctx.record_id.clone(),
            generated_ids: state.ids.generated().clone(),
            default_combination_id,
            diagnostics: state.diagnostics.into_vec(),
            variants,
            media,
            started_at,
            duration_ms,
        })
    }

    /// Make an existing primary row visible to backfill, under the entity
    /// name and its key column.
    async fn seed_target(&self, state: &mut RunState, ctx: &RunContext, primary: &str, id: i64) {
        state.ids.seed(primary, id, true);
        let physical = physical_table(&ctx.table_prefix, primary);
        if let Some(schema) = state.schema.table(&physical).await {
            if let Some(key) = schema.surrogate_key() {
                state.ids.remember_column(&key.name, id);
            }
        }
        debug!("Seeded {} id {}", primary, id);
    }
}
