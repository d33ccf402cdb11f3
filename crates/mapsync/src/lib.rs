//! # mapsync
//!
//! Mapping-driven synchronization of extracted catalog records into a
//! commerce database schema.
//!
//! A declarative mapping says which target tables to write and how each
//! column is computed from a source record. The engine discovers the target
//! schema at run time and turns one record into guarded, idempotent writes:
//!
//! - **Value resolution** from record, variant and run metadata paths
//! - **Schema-aware writes** fanned out over store, language and group scopes
//! - **Defaults fill gaps**, explicit mappings always win
//! - **Combination building** for product variants and their attributes
//! - **Partial success**: everything that goes wrong becomes a diagnostic
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mapsync::{Config, MappingSpec, MysqlStore, RunContext, SyncEngine};
//!
//! #[tokio::main]
//! async fn main() -> mapsync::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let mapping = MappingSpec::load("mapping.yaml")?;
//!     let record: serde_json::Value =
//!         serde_json::from_str(&std::fs::read_to_string("record.json")?)?;
//!
//!     let store = Arc::new(MysqlStore::new(&config.target).await?);
//!     let engine = SyncEngine::new(store, config.sync.clone());
//!     let ctx = RunContext::from_config(&config, "sku-1042");
//!     let result = engine.run(&mapping, &record, &ctx).await?;
//!     println!("{} diagnostic(s)", result.diagnostics.len());
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod config;
pub mod core;
pub mod diagnostics;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod introspect;
pub mod mapping;
pub mod media;
pub mod resolve;
pub mod scope;
pub mod state;
pub mod variants;
pub mod writer;

// Re-exports for convenient access
pub use audit::{
    AuditEvent, AuditSink, ChannelAuditSink, MemoryAuditSink, NoOpAuditSink, TracingAuditSink,
    WriteAction,
};
pub use config::{Config, SyncConfig, TargetConfig, VariantTables};
pub use crate::core::{Column, ColumnKind, Row, SqlValue, TableSchema, TargetStore};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use drivers::{MemoryStore, MysqlStore};
pub use engine::{RunContext, SyncEngine, SyncResult};
pub use error::{Result, SyncError};
pub use introspect::SchemaIntrospector;
pub use mapping::{FieldSpec, MappingSpec, TableBinding, Transform, VariantSpec};
pub use media::{MediaIngest, MediaRequest, MediaSummary};
pub use resolve::Resolver;
pub use scope::ScopeTuple;
pub use state::RunState;
pub use variants::{VariantOutcome, VariantReport, VariantStage};
