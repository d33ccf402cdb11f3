//! Schema metadata for target tables as reported by the store's catalog.

use serde::{Deserialize, Serialize};

/// Coarse classification of a column's data type.
///
/// Drives blank coercion (numeric blanks become `0`, temporal blanks become
/// NULL) and value conversion before binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Integer,
    Decimal,
    Float,
    Text,
    Temporal,
    Other,
}

impl ColumnKind {
    /// Classify a catalog `DATA_TYPE` string.
    pub fn from_data_type(data_type: &str) -> Self {
        let base = data_type
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default()
            .to_lowercase();
        match base.as_str() {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "bit"
            | "bool" | "boolean" | "year" => ColumnKind::Integer,
            "decimal" | "numeric" | "dec" | "fixed" => ColumnKind::Decimal,
            "float" | "double" | "real" => ColumnKind::Float,
            "char" | "varchar" | "tinytext" | "text" | "mediumtext" | "longtext" | "enum"
            | "set" | "json" => ColumnKind::Text,
            "date" | "datetime" | "timestamp" | "time" => ColumnKind::Temporal,
            _ => ColumnKind::Other,
        }
    }

    /// Integer, decimal or float.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ColumnKind::Integer | ColumnKind::Decimal | ColumnKind::Float
        )
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Data type (e.g., "int", "varchar", "datetime").
    pub data_type: String,

    /// Maximum character length for string types.
    pub max_length: Option<u32>,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Whether the column is AUTO_INCREMENT.
    pub is_auto_increment: bool,
}

impl Column {
    /// Convenience constructor used by tests and the in-memory store.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            max_length: None,
            is_nullable: true,
            is_auto_increment: false,
        }
    }

    pub fn with_max_length(mut self, len: u32) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.is_auto_increment = true;
        self.is_nullable = false;
        self
    }

    /// Classified kind of this column.
    pub fn kind(&self) -> ColumnKind {
        ColumnKind::from_data_type(&self.data_type)
    }
}

/// Snapshot of one physical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Physical table name (prefix included).
    pub name: String,

    /// Column definitions in ordinal order.
    pub columns: Vec<Column>,

    /// Primary key column names in key order.
    pub primary_key: Vec<String>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Builder: append a column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Builder: set the primary key.
    pub fn primary_key<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = cols.into_iter().map(Into::into).collect();
        self
    }

    /// Find a column by exact name.
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check whether the table has a column.
    pub fn has_column(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// The single AUTO_INCREMENT primary key column, if that is the whole key.
    pub fn surrogate_key(&self) -> Option<&Column> {
        match self.primary_key.as_slice() {
            [only] => self.get(only).filter(|c| c.is_auto_increment),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_table() -> TableSchema {
        TableSchema::new("ps_product")
            .column(Column::new("id_product", "int").auto_increment())
            .column(Column::new("reference", "varchar").with_max_length(64))
            .column(Column::new("price", "decimal(20,6)"))
            .column(Column::new("date_add", "datetime"))
            .primary_key(["id_product"])
    }

    #[test]
    fn test_column_kind_classification() {
        assert_eq!(ColumnKind::from_data_type("int"), ColumnKind::Integer);
        assert_eq!(ColumnKind::from_data_type("INT(10) unsigned"), ColumnKind::Integer);
        assert_eq!(ColumnKind::from_data_type("decimal(20,6)"), ColumnKind::Decimal);
        assert_eq!(ColumnKind::from_data_type("varchar"), ColumnKind::Text);
        assert_eq!(ColumnKind::from_data_type("datetime"), ColumnKind::Temporal);
        assert_eq!(ColumnKind::from_data_type("geometry"), ColumnKind::Other);
        assert!(ColumnKind::Float.is_numeric());
        assert!(!ColumnKind::Temporal.is_numeric());
    }

    #[test]
    fn test_surrogate_key() {
        let table = product_table();
        assert_eq!(
            table.surrogate_key().map(|c| c.name.as_str()),
            Some("id_product")
        );

        let composite = TableSchema::new("ps_product_lang")
            .column(Column::new("id_product", "int"))
            .column(Column::new("id_lang", "int"))
            .primary_key(["id_product", "id_lang"]);
        assert!(composite.surrogate_key().is_none());
        assert!(composite.has_pk());
    }

    #[test]
    fn test_has_column() {
        let table = product_table();
        assert!(table.has_column("reference"));
        assert!(!table.has_column("unknown"));
        assert_eq!(table.get("reference").and_then(|c| c.max_length), Some(64));
    }
}
