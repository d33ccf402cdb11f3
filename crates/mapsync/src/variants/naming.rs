//! Attribute group and value name normalization.

use serde_json::Value;

/// Prefixes feed exporters put in front of attribute keys.
const KEY_PREFIXES: &[&str] = &["attribute_", "attr_", "pa_"];

/// Symbol spellings and the legacy ASCII spellings older catalogs used.
const LEGACY_TOKENS: &[(&str, &str)] = &[
    ("Ø", "diam."),
    ("°", "deg"),
    ("mL", "ml"),
    ("²", "2"),
    ("³", "3"),
    ("µ", "u"),
    ("×", "x"),
];

/// Human label for an attribute key: `pa_screen-size` becomes `Screen Size`.
pub fn normalize_group_label(key: &str) -> String {
    let stripped = strip_prefix_ci(key.trim());
    stripped
        .replace(['_', '-'], " ")
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Cache and comparison key: lowercase, trimmed, single spaces.
pub fn normalize_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lookup candidates for an existing group or value name: the name itself,
/// then every spelling obtained by swapping one symbol for its legacy form
/// (or back).
pub fn legacy_variants(name: &str) -> Vec<String> {
    let name = name.trim();
    let mut candidates = vec![name.to_string()];
    for (symbol, legacy) in LEGACY_TOKENS {
        for (from, to) in [(symbol, legacy), (legacy, symbol)] {
            if name.contains(*from) {
                let candidate = name.replace(*from, to);
                if !candidates.contains(&candidate) {
                    candidates.push(candidate);
                }
            }
        }
    }
    candidates
}

/// Spellings under which a variant may carry the value for `key`.
pub fn attribute_key_candidates(key: &str) -> Vec<String> {
    let key = key.trim();
    let base = strip_prefix_ci(key);
    let mut stems = vec![key.to_string(), base.to_string(), base.to_lowercase()];
    for stem in stems.clone() {
        stems.push(stem.replace('_', "-"));
        stems.push(stem.replace('-', "_"));
        stems.push(stem.replace(' ', "_"));
        stems.push(stem.replace(['_', '-'], " "));
    }

    let mut candidates: Vec<String> = Vec::new();
    let prefixed = stems
        .iter()
        .flat_map(|stem| KEY_PREFIXES.iter().map(move |p| format!("{}{}", p, stem)));
    for candidate in stems.iter().cloned().chain(prefixed) {
        if !candidate.is_empty() && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    }
    candidates
}

/// Value for `key` in a variant's attribute map, tolerant of key spelling.
///
/// Exact spellings from [`attribute_key_candidates`] are tried first, then
/// any key whose normalized label matches.
pub fn lookup_attribute<'v>(attributes: &'v Value, key: &str) -> Option<&'v Value> {
    let map = attributes.as_object()?;
    attribute_key_candidates(key)
        .iter()
        .find_map(|candidate| map.get(candidate))
        .or_else(|| {
            let wanted = normalize_key(&normalize_group_label(key));
            map.iter()
                .find(|(k, _)| normalize_key(&normalize_group_label(k)) == wanted)
                .map(|(_, v)| v)
        })
}

fn strip_prefix_ci(key: &str) -> &str {
    for prefix in KEY_PREFIXES {
        if key.len() > prefix.len()
            && key.is_char_boundary(prefix.len())
            && key[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            return &key[prefix.len()..];
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_group_label() {
        assert_eq!(normalize_group_label("color"), "Color");
        assert_eq!(normalize_group_label("pa_screen-size"), "Screen Size");
        assert_eq!(normalize_group_label("Attribute_inner_DIAMETER"), "Inner DIAMETER");
        assert_eq!(normalize_group_label("  attr__size  "), "Size");
        assert_eq!(normalize_group_label("Color"), "Color");
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  Dark   Red "), "dark red");
        assert_eq!(normalize_key("RED"), normalize_key("red"));
    }

    #[test]
    fn test_legacy_variants() {
        let candidates = legacy_variants("Ø 20 mm");
        assert_eq!(candidates[0], "Ø 20 mm");
        assert!(candidates.contains(&"diam. 20 mm".to_string()));

        let back = legacy_variants("diam. 20 mm");
        assert!(back.contains(&"Ø 20 mm".to_string()));

        assert_eq!(legacy_variants("Red"), vec!["Red"]);
    }

    #[test]
    fn test_attribute_key_candidates() {
        let candidates = attribute_key_candidates("screen_size");
        assert_eq!(candidates[0], "screen_size");
        assert!(candidates.contains(&"screen-size".to_string()));
        assert!(candidates.contains(&"pa_screen_size".to_string()));

        let stripped = attribute_key_candidates("pa_color");
        assert!(stripped.contains(&"color".to_string()));
    }

    #[test]
    fn test_lookup_attribute_tolerates_spelling() {
        let attributes = json!({"pa_screen-size": "15\"", "Color": "Red"});
        assert_eq!(lookup_attribute(&attributes, "screen_size"), Some(&json!("15\"")));
        assert_eq!(lookup_attribute(&attributes, "Color"), Some(&json!("Red")));
        assert_eq!(lookup_attribute(&attributes, "color"), Some(&json!("Red")));
        assert_eq!(lookup_attribute(&attributes, "size"), None);
        assert_eq!(lookup_attribute(&json!("x"), "size"), None);
    }
}
