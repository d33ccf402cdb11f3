//! The mapping document: which tables to write and how to compute each column.
//!
//! A mapping is owned by the caller and immutable for one run. It loads from
//! YAML or JSON:
//!
//! ```yaml
//! primary: product
//! settings:
//!   store_ids: [1]
//! tables:
//!   product:
//!     fields:
//!       reference: [sku, "$.product.ref"]
//!       active: "=1"
//!     defaults:
//!       price: "=0"
//!   product_lang:
//!     fields:
//!       name: { paths: [title], transforms: [trim, "truncate:128"] }
//!       link_rewrite: { paths: [title], transforms: [slugify] }
//! variants:
//!   combination:
//!     fields:
//!       price: "@.price_impact"
//! ```

mod field;
mod transform;

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, SyncError};

pub use field::{FieldPath, FieldSpec, PathRoot, DEFAULT_JOIN_SEPARATOR};
pub use transform::{apply_all, Transform};

/// Root of a mapping document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingSpec {
    /// Entity written before every other table. Falls back to the configured
    /// primary entity when absent.
    #[serde(default)]
    pub primary: Option<String>,

    /// Run-global scope settings (the `G` layer of scope planning).
    #[serde(default)]
    pub settings: ScopeSettings,

    /// Entity name to table binding.
    #[serde(default)]
    pub tables: IndexMap<String, TableBinding>,

    /// Variant/combination handling, when the record carries variants.
    #[serde(default)]
    pub variants: Option<VariantSpec>,
}

/// Field specs and scope settings for one entity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableBinding {
    /// Mapping-sourced columns: always overwrite.
    #[serde(default)]
    pub fields: IndexMap<String, FieldSpec>,

    /// Default-sourced columns: only fill NULL/empty existing values, and are
    /// skipped entirely in strict mapping mode.
    #[serde(default)]
    pub defaults: IndexMap<String, FieldSpec>,

    #[serde(default)]
    pub settings: ScopeSettings,
}

/// Per-table (or global) scope axis values and fixed column values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScopeSettings {
    #[serde(default, alias = "storeIds", alias = "shop_ids")]
    pub store_ids: Vec<i64>,

    #[serde(default, alias = "languageIds", alias = "lang_ids")]
    pub language_ids: Vec<i64>,

    #[serde(default, alias = "groupIds")]
    pub group_ids: Vec<i64>,

    /// Literal values assigned to columns the table actually has.
    #[serde(default, alias = "fixedValues", alias = "fixed_values")]
    pub fixed: IndexMap<String, Value>,
}

/// One explicitly declared attribute group.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupSpec {
    /// Group label used for lookup and creation.
    pub name: String,

    /// Attribute key inside each variant; defaults to `name`.
    #[serde(default)]
    pub key: Option<String>,

    /// Explicit value recipe evaluated with the variant as item context.
    /// Overrides the key lookup when present.
    #[serde(default)]
    pub value: Option<FieldSpec>,

    /// Public label recipe; defaults to `name`.
    #[serde(default)]
    pub public_name: Option<FieldSpec>,

    /// Group type (`select`, `radio`, `color`).
    #[serde(default = "default_group_type", rename = "type", alias = "group_type")]
    pub group_type: String,
}

/// How to turn the record's variants into combinations.
#[derive(Debug, Clone, Deserialize)]
pub struct VariantSpec {
    /// Path of the variant list in the source record.
    #[serde(default = "default_variant_source")]
    pub source: String,

    /// Path of the attribute map inside one variant.
    #[serde(default = "default_attributes_path")]
    pub attributes: String,

    /// External reference used to find an existing combination on re-runs.
    #[serde(default = "default_reference")]
    pub reference: FieldSpec,

    /// Explicit groups; inferred from the first variant when empty.
    #[serde(default)]
    pub groups: Vec<GroupSpec>,

    /// Fields for the combination row.
    #[serde(default)]
    pub combination: TableBinding,

    /// Fields for the per-store combination satellite row.
    #[serde(default)]
    pub combination_shop: TableBinding,

    /// Re-apply `combination_shop` fields to every existing combination of
    /// the product, not only the ones touched by this run.
    #[serde(default)]
    pub map_all: bool,
}

impl Default for VariantSpec {
    fn default() -> Self {
        Self {
            source: default_variant_source(),
            attributes: default_attributes_path(),
            reference: default_reference(),
            groups: Vec::new(),
            combination: TableBinding::default(),
            combination_shop: TableBinding::default(),
            map_all: false,
        }
    }
}

fn default_group_type() -> String {
    "select".to_string()
}

fn default_variant_source() -> String {
    "variants".to_string()
}

fn default_attributes_path() -> String {
    "attributes".to_string()
}

fn default_reference() -> FieldSpec {
    FieldSpec::Alternatives(vec![
        FieldSpec::path("@.sku"),
        FieldSpec::path("@.reference"),
    ])
}

impl MappingSpec {
    /// Load a mapping document; `.json` files parse as JSON, anything else as YAML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| SyncError::Mapping(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::Mapping(e.to_string()))
    }

    /// Entity write order: the primary entity first, the rest as declared.
    pub fn ordered_entities<'a>(&'a self, primary: &str) -> Vec<&'a str> {
        let mut order: Vec<&str> = self
            .tables
            .keys()
            .filter(|name| name.as_str() == primary)
            .map(String::as_str)
            .collect();
        order.extend(
            self.tables
                .keys()
                .filter(|name| name.as_str() != primary)
                .map(String::as_str),
        );
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPPING: &str = r#"
primary: product
settings:
  store_ids: [1]
tables:
  product_lang:
    fields:
      name: { paths: [title], transforms: [trim] }
  product:
    fields:
      reference: sku
      active: "=1"
    defaults:
      price: "=0"
    settings:
      storeIds: [1, 2]
      fixed: { visibility: both }
variants:
  groups:
    - { name: Color, type: color }
  combination_shop:
    fields:
      price: "@.price_impact"
  map_all: true
"#;

    #[test]
    fn test_parse_yaml_mapping() {
        let mapping = MappingSpec::from_yaml(MAPPING).unwrap();
        assert_eq!(mapping.primary.as_deref(), Some("product"));
        assert_eq!(mapping.settings.store_ids, vec![1]);

        let product = &mapping.tables["product"];
        assert_eq!(product.fields["reference"], FieldSpec::path("sku"));
        assert_eq!(product.fields["active"], FieldSpec::constant("1"));
        assert_eq!(product.defaults["price"], FieldSpec::constant("0"));
        assert_eq!(product.settings.store_ids, vec![1, 2]);
        assert_eq!(product.settings.fixed["visibility"], "both");

        let variants = mapping.variants.as_ref().unwrap();
        assert_eq!(variants.source, "variants");
        assert_eq!(variants.groups[0].group_type, "color");
        assert!(variants.map_all);
        assert!(variants.combination.fields.is_empty());
    }

    #[test]
    fn test_ordered_entities_puts_primary_first() {
        let mapping = MappingSpec::from_yaml(MAPPING).unwrap();
        assert_eq!(
            mapping.ordered_entities("product"),
            vec!["product", "product_lang"]
        );
        assert_eq!(
            mapping.ordered_entities("category"),
            vec!["product_lang", "product"]
        );
    }

    #[test]
    fn test_parse_json_mapping() {
        let json = r#"{"tables": {"widget": {"fields": {"name": "title", "code": "=FIXED"}}}}"#;
        let mapping = MappingSpec::from_json(json).unwrap();
        assert!(mapping.primary.is_none());
        assert!(mapping.variants.is_none());
        assert_eq!(
            mapping.tables["widget"].fields["code"],
            FieldSpec::constant("FIXED")
        );
    }

    #[test]
    fn test_invalid_field_spec_is_a_mapping_error() {
        let err = MappingSpec::from_json(r#"{"tables": {"t": {"fields": {"c": {"x": 1}}}}}"#)
            .unwrap_err();
        assert!(matches!(err, SyncError::Mapping(_)));
    }
}
