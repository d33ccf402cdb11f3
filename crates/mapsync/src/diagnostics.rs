//! Run diagnostics.
//!
//! A run never aborts because one table or scope tuple could not be written.
//! Each such event becomes a [`Diagnostic`] in the run result so partial
//! success is visible and testable.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Mapped table does not exist in the target store.
    MissingTable,
    /// A primary key column could not be resolved for a scope tuple.
    MissingPrimaryKey,
    /// Nothing from the mapping landed in the row for a scope tuple.
    NoMappedColumns,
    /// A string was cut to the column's declared length.
    Truncated,
    /// A scope axis the table requires has no values.
    MappingMissingAxis,
    /// The store rejected a write.
    WriteFailed,
    /// A non-numeric value was coerced for a numeric column.
    Coerced,
    /// A variant was abandoned part way through.
    VariantFailed,
    /// A combination link was skipped because an id did not resolve.
    LinkSkipped,
    /// The media collaborator reported a failure.
    MediaFailed,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticKind::MissingTable => "missing_table",
            DiagnosticKind::MissingPrimaryKey => "missing_primary_key",
            DiagnosticKind::NoMappedColumns => "no_mapped_columns",
            DiagnosticKind::Truncated => "truncated",
            DiagnosticKind::MappingMissingAxis => "mapping_missing_axis",
            DiagnosticKind::WriteFailed => "write_failed",
            DiagnosticKind::Coerced => "coerced",
            DiagnosticKind::VariantFailed => "variant_failed",
            DiagnosticKind::LinkSkipped => "link_skipped",
            DiagnosticKind::MediaFailed => "media_failed",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One diagnostic entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,

    /// Physical table name, or entity name when the table never resolved.
    pub table: String,

    /// Scope tuple rendering, empty when not tied to one tuple.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,

    pub detail: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, table: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            scope: String::new(),
            detail: detail.into(),
        }
    }

    /// Attach the scope tuple the diagnostic refers to.
    pub fn at(mut self, scope: impl fmt::Display) -> Self {
        self.scope = scope.to_string();
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scope.is_empty() {
            write!(f, "[{}] {}: {}", self.kind, self.table, self.detail)
        } else {
            write!(
                f,
                "[{}] {} ({}): {}",
                self.kind, self.table, self.scope, self.detail
            )
        }
    }
}

/// Ordered collection of diagnostics for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic, logging it once.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        tracing::warn!(kind = %diagnostic.kind, table = %diagnostic.table, "{}", diagnostic);
        self.0.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    /// Diagnostics of one kind.
    pub fn of_kind(&self, kind: DiagnosticKind) -> Vec<&Diagnostic> {
        self.0.iter().filter(|d| d.kind == kind).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}
