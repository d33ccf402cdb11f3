//! String transforms applied after a field value is resolved.

use serde::Deserialize;
use serde_json::Value;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// One step of a transform pipeline.
///
/// Pipelines run in declared order. Names this version does not know parse to
/// [`Transform::Unknown`] and leave the value untouched, so newer mapping
/// documents still load.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Value")]
pub enum Transform {
    Trim,
    Replace { find: String, with: String },
    StripHtml,
    Truncate(usize),
    Slugify,
    Unknown(String),
}

impl Transform {
    /// Apply the transform to a string.
    pub fn apply(&self, input: &str) -> String {
        match self {
            Transform::Trim => input.trim().to_string(),
            Transform::Replace { find, with } if !find.is_empty() => input.replace(find, with),
            Transform::Replace { .. } => input.to_string(),
            Transform::StripHtml => strip_html(input),
            Transform::Truncate(n) => input.chars().take(*n).collect(),
            Transform::Slugify => slugify(input),
            Transform::Unknown(_) => input.to_string(),
        }
    }

    fn from_name(name: &str) -> Transform {
        let (op, arg) = match name.split_once(':') {
            Some((op, arg)) => (op.trim(), Some(arg.trim())),
            None => (name.trim(), None),
        };
        match (normalize_op(op).as_str(), arg) {
            ("trim", _) => Transform::Trim,
            ("striphtml", _) => Transform::StripHtml,
            ("slugify", _) => Transform::Slugify,
            ("truncate", Some(n)) => n
                .parse()
                .map(Transform::Truncate)
                .unwrap_or_else(|_| Transform::Unknown(name.to_string())),
            _ => Transform::Unknown(name.to_string()),
        }
    }
}

impl TryFrom<Value> for Transform {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(name) => Ok(Transform::from_name(&name)),
            Value::Object(map) => {
                let op = map
                    .get("op")
                    .and_then(Value::as_str)
                    .ok_or_else(|| "transform object needs an \"op\" field".to_string())?;
                let text = |key: &str| {
                    map.get(key)
                        .map(|v| match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .unwrap_or_default()
                };
                Ok(match normalize_op(op).as_str() {
                    "replace" => Transform::Replace {
                        find: text("find"),
                        with: map
                            .get("replace")
                            .or_else(|| map.get("with"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    },
                    "truncate" => match map
                        .get("len")
                        .or_else(|| map.get("length"))
                        .and_then(Value::as_u64)
                    {
                        Some(n) => Transform::Truncate(n as usize),
                        None => Transform::Unknown(op.to_string()),
                    },
                    _ => Transform::from_name(op),
                })
            }
            other => Err(format!("unsupported transform: {}", other)),
        }
    }
}

/// Apply a pipeline in declared order.
pub fn apply_all(transforms: &[Transform], input: &str) -> String {
    transforms
        .iter()
        .fold(input.to_string(), |acc, t| t.apply(&acc))
}

fn normalize_op(op: &str) -> String {
    op.chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_lowercase()
}

/// Remove markup tags, decode the common entities, collapse whitespace.
fn strip_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => {
                in_tag = true;
                out.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    let decoded = out
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Letters NFD leaves whole.
fn fold_letter(c: char) -> Option<&'static str> {
    Some(match c {
        'æ' => "ae",
        'œ' => "oe",
        'ß' => "ss",
        'ø' => "o",
        'ł' => "l",
        'đ' | 'ð' => "d",
        'þ' => "th",
        'ı' => "i",
        _ => return None,
    })
}

/// URL-friendly lowercase form: accents folded to ASCII, runs of anything
/// else become a single dash.
fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    let lowered = input.to_lowercase();
    for c in lowered.nfd().filter(|c| !is_combining_mark(*c)) {
        let piece = if c.is_ascii_alphanumeric() {
            Some(c.to_string())
        } else {
            fold_letter(c).map(str::to_string)
        };
        match piece {
            Some(p) => {
                if pending_dash && !out.is_empty() {
                    out.push('-');
                }
                pending_dash = false;
                out.push_str(&p);
            }
            None => pending_dash = true,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_names() {
        let t: Transform = serde_json::from_value(json!("trim")).unwrap();
        assert_eq!(t, Transform::Trim);
        let t: Transform = serde_json::from_value(json!("stripHtml")).unwrap();
        assert_eq!(t, Transform::StripHtml);
        let t: Transform = serde_json::from_value(json!("strip_html")).unwrap();
        assert_eq!(t, Transform::StripHtml);
        let t: Transform = serde_json::from_value(json!("truncate:5")).unwrap();
        assert_eq!(t, Transform::Truncate(5));
    }

    #[test]
    fn test_parse_objects() {
        let t: Transform =
            serde_json::from_value(json!({"op": "replace", "find": ",", "replace": "."})).unwrap();
        assert_eq!(
            t,
            Transform::Replace {
                find: ",".into(),
                with: ".".into()
            }
        );
        let t: Transform = serde_json::from_value(json!({"op": "truncate", "len": 3})).unwrap();
        assert_eq!(t, Transform::Truncate(3));
    }

    #[test]
    fn test_unknown_is_noop() {
        let t: Transform = serde_json::from_value(json!("uppercase_everything")).unwrap();
        assert!(matches!(t, Transform::Unknown(_)));
        assert_eq!(t.apply("Keep Me"), "Keep Me");
    }

    #[test]
    fn test_strip_html() {
        assert_eq!(
            Transform::StripHtml.apply("<p>Hello&nbsp;<b>world</b></p>\n<br/>Tom &amp; Jerry"),
            "Hello world Tom & Jerry"
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(Transform::Slugify.apply("Pompe à eau 12V!"), "pompe-a-eau-12v");
        assert_eq!(Transform::Slugify.apply("  --Hello--  "), "hello");
    }

    #[test]
    fn test_slugify_beyond_latin1() {
        assert_eq!(Transform::Slugify.apply("Łódź Škoda"), "lodz-skoda");
        assert_eq!(Transform::Slugify.apply("Ærø Straße"), "aero-strasse");
        assert_eq!(Transform::Slugify.apply("Đặng Văn"), "dang-van");
        assert_eq!(Transform::Slugify.apply("Привет 42"), "42");
    }

    #[test]
    fn test_pipeline_order() {
        let trim_first = vec![Transform::Trim, Transform::Truncate(4)];
        assert_eq!(apply_all(&trim_first, "  Hello World "), "Hell");
        let truncate_first = vec![Transform::Truncate(4), Transform::Trim];
        assert_eq!(apply_all(&truncate_first, "  Hello World "), "He");
    }
}
