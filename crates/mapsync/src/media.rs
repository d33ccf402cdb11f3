//! Image ingestion contract.
//!
//! Downloading, hashing, resizing and uploading product images happen
//! outside this crate. The engine only asks a [`MediaIngest`] collaborator to
//! process one record after the rows are written and attaches its summary to
//! the run result.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// What the media collaborator gets for one run.
#[derive(Debug, Clone, Copy)]
pub struct MediaRequest<'a> {
    pub record_id: &'a str,
    /// Id of the primary entity row, when one was written or supplied.
    pub target_id: Option<i64>,
    pub record: &'a Value,
}

/// Outcome reported by the media collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

/// Run this, return a summary.
#[async_trait]
pub trait MediaIngest: Send + Sync {
    async fn ingest(&self, request: MediaRequest<'_>) -> Result<MediaSummary>;
}
