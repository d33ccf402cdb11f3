//! Write Row construction.
//!
//! A row is built in two stages. [`draft_fields`] resolves a table binding
//! into a [`RowDraft`] of JSON cells that remember where each value came
//! from; [`finalize`] then converts the draft into a store [`Row`] against the
//! table's schema, dropping unknown columns, coercing blanks and
//! non-numeric text, and truncating over-long strings.

use indexmap::IndexMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::core::schema::{Column, ColumnKind, TableSchema};
use crate::core::value::{Row, SqlValue};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::mapping::TableBinding;
use crate::resolve::{value_to_text, Resolver};
use crate::variants::parse_locale_decimal;

/// Layer a cell's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Explicit field spec: always overwrites.
    Mapping,
    /// Default field spec: only fills NULL or empty existing values.
    Default,
    /// Fixed value from scope settings.
    Fixed,
    /// Scope axis column.
    Scope,
    /// Surrogate key from the run's id cache.
    Key,
}

/// One pending column value.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub value: Value,
    pub source: ValueSource,
    /// Path, `constant`, `fixed`, `scope` or `backfill`.
    pub origin: String,
}

impl Cell {
    pub fn new(value: impl Into<Value>, source: ValueSource, origin: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            source,
            origin: origin.into(),
        }
    }
}

/// Column to pending value, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowDraft {
    cells: IndexMap<String, Cell>,
}

impl RowDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing any previous value.
    pub fn set(&mut self, column: impl Into<String>, cell: Cell) {
        self.cells.insert(column.into(), cell);
    }

    /// Set a column unless it already has a value.
    pub fn set_if_absent(&mut self, column: &str, cell: Cell) {
        if !self.cells.contains_key(column) {
            self.cells.insert(column.to_string(), cell);
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<Cell> {
        self.cells.shift_remove(column)
    }

    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.cells.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.cells.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Cell)> {
        self.cells.iter()
    }
}

/// What to do with text that does not parse as a number for a numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericPolicy {
    /// Write `0` (generic tables).
    Neutral,
    /// Leave the column out so the existing value stays (combination rows).
    Omit,
    /// Write `0` (per-store combination rows).
    Zero,
}

/// A draft converted against a schema, ready for the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Finalized {
    pub row: Row,
    /// Default-sourced columns: fill-only on upsert.
    pub fill_only: Vec<String>,
    /// Column to value origin, for the per-field audit trail.
    pub origins: IndexMap<String, String>,
    /// Truncation and coercion notes, not yet tied to a scope.
    pub notes: Vec<Diagnostic>,
}

impl Finalized {
    /// Drop default-sourced columns that would not fill a gap in `existing`.
    pub fn retain_fillable(&mut self, existing: &Row) {
        let keep: Vec<String> = self
            .fill_only
            .iter()
            .filter(|col| existing.get(*col).map_or(true, SqlValue::is_blank))
            .cloned()
            .collect();
        for col in self.fill_only.iter().filter(|c| !keep.contains(*c)) {
            self.row.shift_remove(col);
            self.origins.shift_remove(col);
        }
        self.fill_only = keep;
    }
}

/// Resolve a table binding into a draft.
///
/// Order of layers: mapping fields for columns the table has; default fields
/// for columns still unset (unless `include_defaults` is false); then global
/// and table fixed values, which override both.
pub fn draft_fields(
    schema: &TableSchema,
    binding: &TableBinding,
    global_fixed: &IndexMap<String, Value>,
    resolver: &Resolver<'_>,
    include_defaults: bool,
) -> RowDraft {
    let mut draft = RowDraft::new();

    for (column, spec) in &binding.fields {
        if !schema.has_column(column) {
            continue;
        }
        if let Some(resolved) = resolver.resolve_traced(spec, &mut |_| {}) {
            draft.set(
                column.clone(),
                Cell::new(resolved.value, ValueSource::Mapping, resolved.origin),
            );
        }
    }

    if include_defaults {
        for (column, spec) in &binding.defaults {
            if !schema.has_column(column) || draft.contains(column) {
                continue;
            }
            if let Some(resolved) = resolver.resolve_traced(spec, &mut |_| {}) {
                draft.set(
                    column.clone(),
                    Cell::new(
                        resolved.value,
                        ValueSource::Default,
                        format!("default:{}", resolved.origin),
                    ),
                );
            }
        }
    }

    for (column, value) in global_fixed.iter().chain(&binding.settings.fixed) {
        if schema.has_column(column) {
            draft.set(
                column.clone(),
                Cell::new(value.clone(), ValueSource::Fixed, "fixed"),
            );
        }
    }

    draft
}

/// Convert a draft into a store row against `schema`.
pub fn finalize(schema: &TableSchema, draft: RowDraft, policy: NumericPolicy) -> Finalized {
    let mut out = Finalized::default();

    for (name, cell) in draft.cells {
        let Some(column) = schema.get(&name) else {
            continue;
        };
        let Some(value) = coerce(&schema.name, column, &cell.value, policy, &mut out.notes) else {
            continue;
        };
        let value = truncate(&schema.name, column, value, &mut out.notes);

        if cell.source == ValueSource::Default {
            out.fill_only.push(name.clone());
        }
        out.origins.insert(name.clone(), cell.origin);
        out.row.insert(name, value);
    }

    out
}

fn coerce(
    table: &str,
    column: &Column,
    value: &Value,
    policy: NumericPolicy,
    notes: &mut Vec<Diagnostic>,
) -> Option<SqlValue> {
    if value.is_null() {
        return Some(SqlValue::Null);
    }

    match column.kind() {
        kind if kind.is_numeric() => {
            let parsed = match value {
                Value::Bool(b) => Ok(Decimal::from(i64::from(*b))),
                Value::Number(_) => SqlValue::from_json(value)
                    .as_decimal()
                    .ok_or("is out of range"),
                Value::String(s) if s.trim().is_empty() => Ok(Decimal::ZERO),
                Value::String(s) => parse_locale_decimal(s).ok_or("is not numeric"),
                _ => Err("is not numeric"),
            }
            .and_then(|d| numeric_value(kind, d).ok_or("is out of range"));
            match parsed {
                Ok(v) => Some(v),
                Err(problem) => {
                    let shown = value_to_text(value);
                    match policy {
                        NumericPolicy::Omit => {
                            notes.push(Diagnostic::new(
                                DiagnosticKind::Coerced,
                                table,
                                format!("{}: '{}' {}, left unchanged", column.name, shown, problem),
                            ));
                            None
                        }
                        NumericPolicy::Neutral | NumericPolicy::Zero => {
                            notes.push(Diagnostic::new(
                                DiagnosticKind::Coerced,
                                table,
                                format!("{}: '{}' {}, wrote 0", column.name, shown, problem),
                            ));
                            Some(SqlValue::Int(0))
                        }
                    }
                }
            }
        }
        ColumnKind::Temporal => match value {
            Value::String(s) if s.trim().is_empty() => Some(SqlValue::Null),
            other => Some(SqlValue::Text(value_to_text(other))),
        },
        ColumnKind::Text => match value {
            Value::String(s) => Some(SqlValue::Text(s.clone())),
            other => Some(SqlValue::Text(SqlValue::from_json(other).to_string())),
        },
        _ => Some(SqlValue::from_json(value)),
    }
}

/// `None` when a whole number does not fit an integer column.
fn numeric_value(kind: ColumnKind, d: Decimal) -> Option<SqlValue> {
    if kind == ColumnKind::Integer && d.fract().is_zero() {
        return d.to_i64().map(SqlValue::Int);
    }
    Some(SqlValue::Decimal(d.normalize()))
}

fn truncate(table: &str, column: &Column, value: SqlValue, notes: &mut Vec<Diagnostic>) -> SqlValue {
    match (value, column.max_length) {
        (SqlValue::Text(text), Some(max)) if text.chars().count() > max as usize => {
            notes.push(Diagnostic::new(
                DiagnosticKind::Truncated,
                table,
                format!("{}: {} -> {} chars", column.name, text.chars().count(), max),
            ));
            SqlValue::Text(text.chars().take(max as usize).collect())
        }
        (value, _) => value,
    }
}
