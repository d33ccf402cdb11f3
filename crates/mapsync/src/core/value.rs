//! SQL value types exchanged with the target store.
//!
//! Rows are dynamic: a [`Row`] maps column names to [`SqlValue`]s and is only
//! ever built from columns the schema introspector reported, so the engine
//! never needs compiled structs for the commerce schema it writes into.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

/// One dynamic row: column name to value, in insertion order.
pub type Row = IndexMap<String, SqlValue>;

/// SQL value enum for type-safe parameter binding.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (tinyint through bigint).
    Int(i64),

    /// Floating point (float/double).
    Float(f64),

    /// Exact decimal (prices, weights).
    Decimal(Decimal),

    /// Text data.
    Text(String),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Date without time component.
    Date(NaiveDate),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// NULL or a whitespace-only string.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            SqlValue::Null => true,
            SqlValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Integer view of the value, parsing text when needed.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Bool(b) => Some(i64::from(*b)),
            SqlValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            SqlValue::Decimal(d) if d.fract().is_zero() => d.to_i64(),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Decimal view of the value, used for numeric comparisons.
    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            SqlValue::Int(v) => Some(Decimal::from(*v)),
            SqlValue::Float(f) => Decimal::from_f64_retain(*f),
            SqlValue::Decimal(d) => Some(*d),
            SqlValue::Bool(b) => Some(Decimal::from(i64::from(*b))),
            SqlValue::Text(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        }
    }

    /// Equality with MySQL-like leniency: numbers compare by value across
    /// representations and text compares case-insensitively.
    #[must_use]
    pub fn loose_eq(&self, other: &SqlValue) -> bool {
        match (self, other) {
            (SqlValue::Null, SqlValue::Null) => true,
            (SqlValue::Null, _) | (_, SqlValue::Null) => false,
            (SqlValue::Text(a), SqlValue::Text(b)) => a.to_lowercase() == b.to_lowercase(),
            (a, b) => match (a.as_decimal(), b.as_decimal()) {
                (Some(x), Some(y)) => x == y,
                _ => a.to_string() == b.to_string(),
            },
        }
    }

    /// Convert a resolved JSON value without column knowledge.
    ///
    /// Arrays and objects are stored as their JSON text.
    #[must_use]
    pub fn from_json(value: &Value) -> SqlValue {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Int(i)
                } else if let Ok(d) = Decimal::from_str(&n.to_string()) {
                    SqlValue::Decimal(d.normalize())
                } else {
                    SqlValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }

    /// JSON view of the value, used when existing rows act as resolver context.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Bool(*b),
            SqlValue::Int(i) => Value::from(*i),
            SqlValue::Float(f) => Value::from(*f),
            SqlValue::Decimal(d) => Value::String(d.normalize().to_string()),
            SqlValue::Text(s) => Value::String(s.clone()),
            SqlValue::DateTime(dt) => Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            SqlValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Bool(b) => write!(f, "{}", u8::from(*b)),
            SqlValue::Int(i) => write!(f, "{}", i),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Decimal(d) => write!(f, "{}", d.normalize()),
            SqlValue::Text(s) => write!(f, "{}", s),
            SqlValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            SqlValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

// From implementations for common types
impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

/// Build a [`Row`] from `(column, value)` pairs.
pub fn row<I, K, V>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<SqlValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// True when every `(column, value)` of `filter` loosely matches `candidate`.
pub fn row_matches(candidate: &Row, filter: &Row) -> bool {
    filter.iter().all(|(col, expected)| {
        candidate
            .get(col)
            .map(|actual| actual.loose_eq(expected))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_blank() {
        assert!(SqlValue::Null.is_blank());
        assert!(SqlValue::from("   ").is_blank());
        assert!(!SqlValue::from("x").is_blank());
        assert!(!SqlValue::Int(0).is_blank());
    }

    #[test]
    fn test_loose_eq_across_numeric_types() {
        assert!(SqlValue::Int(10).loose_eq(&SqlValue::from("10")));
        assert!(SqlValue::Decimal(Decimal::new(1050, 2)).loose_eq(&SqlValue::Float(10.5)));
        assert!(SqlValue::from("Red").loose_eq(&SqlValue::from("red")));
        assert!(!SqlValue::Null.loose_eq(&SqlValue::Int(0)));
    }

    #[test]
    fn test_from_json() {
        assert_eq!(SqlValue::from_json(&json!(42)), SqlValue::Int(42));
        assert_eq!(SqlValue::from_json(&json!("a")), SqlValue::from("a"));
        assert_eq!(SqlValue::from_json(&json!(null)), SqlValue::Null);
        assert_eq!(
            SqlValue::from_json(&json!(12.5)),
            SqlValue::Decimal(Decimal::new(125, 1))
        );
        assert_eq!(
            SqlValue::from_json(&json!(["a", "b"])),
            SqlValue::from(r#"["a","b"]"#)
        );
    }

    #[test]
    fn test_row_matches() {
        let candidate = row([("id_product", SqlValue::Int(7)), ("reference", "R1".into())]);
        assert!(row_matches(&candidate, &row([("id_product", "7")])));
        assert!(!row_matches(&candidate, &row([("id_product", 8)])));
        assert!(!row_matches(&candidate, &row([("missing", 1)])));
        assert!(row_matches(&candidate, &Row::new()));
    }
}
