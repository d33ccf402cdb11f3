//! Value resolution: evaluate a [`FieldSpec`] against a source record.
//!
//! Resolution is a pure function of (record, context, spec). Nothing here does
//! I/O or fails: a spec that cannot produce a usable value yields `None`,
//! which callers treat as "leave the column out of the row".

use serde_json::Value;

use crate::mapping::{apply_all, FieldPath, FieldSpec, PathRoot, Transform};

/// Tokens treated as "no value" after trimming, case-insensitively.
const NULL_TOKENS: &[&str] = &["undefined", "null", "nan"];

/// A resolved value together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: Value,
    /// `constant` or the path that produced the value.
    pub origin: String,
}

/// Evaluation roots for one resolution.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    record: &'a Value,
    primary: Option<&'a Value>,
    item: Option<&'a Value>,
    meta: Option<&'a Value>,
}

impl<'a> Resolver<'a> {
    pub fn new(record: &'a Value) -> Self {
        Self {
            record,
            primary: None,
            item: None,
            meta: None,
        }
    }

    /// Use `record[entity]` as the primary sub-object when it is an object.
    pub fn with_primary(mut self, entity: &str) -> Self {
        self.primary = self.record.get(entity).filter(|v| v.is_object());
        self
    }

    /// Item context (the current variant).
    pub fn with_item(mut self, item: &'a Value) -> Self {
        self.item = Some(item);
        self
    }

    /// Run metadata namespace for `#.` paths.
    pub fn with_meta(mut self, meta: &'a Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Resolve a spec to a value.
    pub fn resolve(&self, spec: &FieldSpec) -> Option<Value> {
        self.resolve_traced(spec, &mut |_| {}).map(|r| r.value)
    }

    /// Resolve a spec, reporting every spec node that gets evaluated.
    pub fn resolve_traced(
        &self,
        spec: &FieldSpec,
        visit: &mut dyn FnMut(&FieldSpec),
    ) -> Option<Resolved> {
        visit(spec);
        match spec {
            FieldSpec::Constant(value) => Some(Resolved {
                value: value.clone(),
                origin: "constant".to_string(),
            }),
            FieldSpec::PathList { paths, transforms } => paths.iter().find_map(|path| {
                self.lookup(path).map(|value| Resolved {
                    value: transform_value(value, transforms),
                    origin: path.to_string(),
                })
            }),
            FieldSpec::Alternatives(children) => children.iter().find_map(|child| {
                self.resolve_traced(child, visit)
                    .filter(|r| !is_empty_value(&r.value))
            }),
            FieldSpec::Join {
                paths,
                separator,
                transforms,
            } => {
                let parts: Vec<String> = paths
                    .iter()
                    .filter_map(|path| self.lookup(path))
                    .map(|v| value_to_text(&v))
                    .filter(|s| !s.is_empty())
                    .collect();
                if parts.is_empty() {
                    return None;
                }
                let joined = parts.join(separator);
                Some(Resolved {
                    value: Value::String(apply_all(transforms, &joined)),
                    origin: format!(
                        "join({})",
                        paths
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(",")
                    ),
                })
            }
        }
    }

    /// Evaluate one path against its roots in priority order and sanitize.
    fn lookup(&self, path: &FieldPath) -> Option<Value> {
        let roots: Vec<&Value> = match path.root {
            PathRoot::Record => vec![self.record],
            PathRoot::Item => self.item.into_iter().collect(),
            PathRoot::Meta => self.meta.into_iter().collect(),
            PathRoot::Any => self
                .item
                .into_iter()
                .chain(self.primary)
                .chain(Some(self.record))
                .collect(),
        };
        roots
            .into_iter()
            .find_map(|root| walk(root, &path.segments).and_then(sanitize))
    }
}

/// Follow dotted segments; numeric segments index arrays.
fn walk<'v>(root: &'v Value, segments: &[String]) -> Option<&'v Value> {
    segments.iter().try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Reject null, blank strings, and the literal null tokens; trim strings.
pub fn sanitize(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty()
                || NULL_TOKENS
                    .iter()
                    .any(|token| trimmed.eq_ignore_ascii_case(token))
            {
                None
            } else {
                Some(Value::String(trimmed.to_string()))
            }
        }
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.clone()),
    }
}

/// Null or an empty string.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Text rendering used for joins and transforms.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn transform_value(value: Value, transforms: &[Transform]) -> Value {
    if transforms.is_empty() {
        return value;
    }
    match value {
        Value::String(s) => Value::String(apply_all(transforms, &s)),
        Value::Number(_) | Value::Bool(_) => {
            Value::String(apply_all(transforms, &value_to_text(&value)))
        }
        structured => structured,
    }
}
