//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database (the commerce application's MySQL/MariaDB schema).
    pub target: TargetConfig,

    /// Synchronization behavior and run-global defaults.
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Target database configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type (always "mysql" for now).
    #[serde(default = "default_mysql")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode (default: "prefer").
    #[serde(default = "default_prefer")]
    pub ssl_mode: String,

    /// Prefix prepended to entity names to form physical table names.
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .field("table_prefix", &self.table_prefix)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Synchronization behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Default store ids when neither the table nor the mapping sets any.
    #[serde(default)]
    pub store_ids: Vec<i64>,

    /// Default language ids; empty means "active languages of the store".
    #[serde(default)]
    pub language_ids: Vec<i64>,

    /// Default customer group ids.
    #[serde(default)]
    pub group_ids: Vec<i64>,

    /// Only write mapping-sourced values; skip default-sourced fields.
    #[serde(default)]
    pub strict_mapping: bool,

    /// Entity written first when the mapping does not name one.
    #[serde(default = "default_primary_entity")]
    pub primary_entity: String,

    /// Entities that must have at least one group id to be written.
    #[serde(default = "default_group_required_tables")]
    pub group_required_tables: Vec<String>,

    /// Entity holding languages and their `active` flag.
    #[serde(default = "default_language_table")]
    pub language_table: String,

    /// Column names of the three scope axes.
    #[serde(default)]
    pub axis_columns: AxisColumns,

    /// chrono format for the `#.now` metadata value.
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Entity names used by the combination builder.
    #[serde(default)]
    pub variant_tables: VariantTables,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store_ids: Vec::new(),
            language_ids: Vec::new(),
            group_ids: Vec::new(),
            strict_mapping: false,
            primary_entity: default_primary_entity(),
            group_required_tables: default_group_required_tables(),
            language_table: default_language_table(),
            axis_columns: AxisColumns::default(),
            date_format: default_date_format(),
            variant_tables: VariantTables::default(),
        }
    }
}

/// Scope axis column names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisColumns {
    #[serde(default = "default_store_column")]
    pub store: String,
    #[serde(default = "default_language_column")]
    pub language: String,
    #[serde(default = "default_group_column")]
    pub group: String,
}

impl Default for AxisColumns {
    fn default() -> Self {
        Self {
            store: default_store_column(),
            language: default_language_column(),
            group: default_group_column(),
        }
    }
}

/// Catalog entities touched by the combination builder (unprefixed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantTables {
    pub attribute_group: String,
    pub attribute_group_lang: String,
    pub attribute_group_shop: String,
    pub attribute: String,
    pub attribute_lang: String,
    pub attribute_shop: String,
    pub combination: String,
    pub combination_shop: String,
    pub combination_link: String,
    pub product: String,
    pub product_shop: String,
}

impl Default for VariantTables {
    fn default() -> Self {
        Self {
            attribute_group: "attribute_group".to_string(),
            attribute_group_lang: "attribute_group_lang".to_string(),
            attribute_group_shop: "attribute_group_shop".to_string(),
            attribute: "attribute".to_string(),
            attribute_lang: "attribute_lang".to_string(),
            attribute_shop: "attribute_shop".to_string(),
            combination: "product_attribute".to_string(),
            combination_shop: "product_attribute_shop".to_string(),
            combination_link: "product_attribute_combination".to_string(),
            product: "product".to_string(),
            product_shop: "product_shop".to_string(),
        }
    }
}

impl VariantTables {
    /// Every entity name, for validation.
    pub fn all(&self) -> [&str; 11] {
        [
            &self.attribute_group,
            &self.attribute_group_lang,
            &self.attribute_group_shop,
            &self.attribute,
            &self.attribute_lang,
            &self.attribute_shop,
            &self.combination,
            &self.combination_shop,
            &self.combination_link,
            &self.product,
            &self.product_shop,
        ]
    }
}

fn default_mysql() -> String {
    "mysql".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_prefer() -> String {
    "prefer".to_string()
}

fn default_table_prefix() -> String {
    "ps_".to_string()
}

fn default_max_connections() -> usize {
    4
}

fn default_primary_entity() -> String {
    "product".to_string()
}

fn default_group_required_tables() -> Vec<String> {
    vec!["category_group".to_string()]
}

fn default_language_table() -> String {
    "lang".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

fn default_store_column() -> String {
    "id_shop".to_string()
}

fn default_language_column() -> String {
    "id_lang".to_string()
}

fn default_group_column() -> String {
    "id_group".to_string()
}
