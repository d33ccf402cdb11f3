//! Field specs: declarative recipes for computing one column's value.
//!
//! Mapping documents encode specs compactly (`"=literal"`, `"path.to.value"`,
//! lists, objects). They are parsed once into [`FieldSpec`] when the mapping
//! loads, so resolution never re-inspects string prefixes.

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::transform::Transform;

/// Separator used by `join` specs when none is given.
pub const DEFAULT_JOIN_SEPARATOR: &str = "<br />";

/// Which root a path is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathRoot {
    /// Bare path: item context, then the primary sub-object, then the record.
    Any,
    /// `$.`: the whole source record.
    Record,
    /// `@.`: the item context (the current variant).
    Item,
    /// `#.`: run metadata (`now`, `record_id`, `run_id`, `target_id`).
    Meta,
}

/// A parsed dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    pub root: PathRoot,
    pub segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> FieldPath {
        let raw = raw.trim();
        let (root, rest) = match raw.get(..2) {
            Some("$.") => (PathRoot::Record, &raw[2..]),
            Some("@.") => (PathRoot::Item, &raw[2..]),
            Some("#.") => (PathRoot::Meta, &raw[2..]),
            _ => (PathRoot::Any, raw),
        };
        let segments = rest
            .split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        FieldPath { root, segments }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.root {
            PathRoot::Any => "",
            PathRoot::Record => "$.",
            PathRoot::Item => "@.",
            PathRoot::Meta => "#.",
        };
        write!(f, "{}{}", prefix, self.segments.join("."))
    }
}

/// Recipe for one column's value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum FieldSpec {
    /// Literal value; an empty string is a real value, not "missing".
    Constant(Value),

    /// First candidate path yielding a usable value, then the transforms.
    PathList {
        paths: Vec<FieldPath>,
        transforms: Vec<Transform>,
    },

    /// First child spec resolving to a non-empty value.
    Alternatives(Vec<FieldSpec>),

    /// Every non-empty path value joined with `separator`, then the transforms.
    Join {
        paths: Vec<FieldPath>,
        separator: String,
        transforms: Vec<Transform>,
    },
}

impl FieldSpec {
    /// Single-path spec without transforms.
    pub fn path(raw: &str) -> FieldSpec {
        FieldSpec::PathList {
            paths: vec![FieldPath::parse(raw)],
            transforms: Vec::new(),
        }
    }

    /// Literal spec.
    pub fn constant(value: impl Into<Value>) -> FieldSpec {
        FieldSpec::Constant(value.into())
    }

    /// Parse the compact document form.
    pub fn parse(value: &Value) -> Result<FieldSpec, String> {
        match value {
            Value::String(s) => Ok(match s.strip_prefix('=') {
                Some(literal) => FieldSpec::Constant(Value::String(literal.to_string())),
                None => FieldSpec::path(s),
            }),
            Value::Array(items) if items.iter().all(is_plain_path) => Ok(FieldSpec::PathList {
                paths: parse_paths(items)?,
                transforms: Vec::new(),
            }),
            Value::Array(items) => items
                .iter()
                .map(FieldSpec::parse)
                .collect::<Result<Vec<_>, _>>()
                .map(FieldSpec::Alternatives),
            Value::Object(map) => parse_object(map),
            literal => Ok(FieldSpec::Constant(literal.clone())),
        }
    }
}

impl TryFrom<Value> for FieldSpec {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        FieldSpec::parse(&value)
    }
}

/// A list made only of these is a candidate path list; anything else in the
/// list (a literal, an object) turns it into alternatives.
fn is_plain_path(item: &Value) -> bool {
    item.as_str().map_or(false, |s| !s.starts_with('='))
}

fn parse_paths(items: &[Value]) -> Result<Vec<FieldPath>, String> {
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(FieldPath::parse(s)),
            other => Err(format!("path must be a string, got {}", other)),
        })
        .collect()
}

fn parse_transforms(map: &Map<String, Value>) -> Result<Vec<Transform>, String> {
    match map.get("transforms").or_else(|| map.get("transform")) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .cloned()
            .map(Transform::try_from)
            .collect(),
        Some(single) => Ok(vec![Transform::try_from(single.clone())?]),
    }
}

fn parse_object(map: &Map<String, Value>) -> Result<FieldSpec, String> {
    if let Some(value) = map.get("const").or_else(|| map.get("value")) {
        return Ok(FieldSpec::Constant(value.clone()));
    }

    if let Some(children) = map.get("alternatives").or_else(|| map.get("first_of")) {
        let Value::Array(items) = children else {
            return Err("\"alternatives\" must be a list".to_string());
        };
        return items
            .iter()
            .map(FieldSpec::parse)
            .collect::<Result<Vec<_>, _>>()
            .map(FieldSpec::Alternatives);
    }

    let transforms = parse_transforms(map)?;

    if let Some(join) = map.get("join") {
        let Value::Array(items) = join else {
            return Err("\"join\" must be a list of paths".to_string());
        };
        let separator = map
            .get("separator")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_JOIN_SEPARATOR)
            .to_string();
        return Ok(FieldSpec::Join {
            paths: parse_paths(items)?,
            separator,
            transforms,
        });
    }

    let paths = match map.get("paths").or_else(|| map.get("path")) {
        Some(Value::String(s)) => vec![FieldPath::parse(s)],
        Some(Value::Array(items)) => parse_paths(items)?,
        Some(other) => return Err(format!("invalid path list: {}", other)),
        None => {
            return Err(format!(
                "field spec object needs one of const/path/paths/alternatives/join: {}",
                Value::Object(map.clone())
            ))
        }
    };

    Ok(FieldSpec::PathList { paths, transforms })
}
