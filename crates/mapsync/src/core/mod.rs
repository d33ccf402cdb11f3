//! Core abstractions shared by every part of the engine.
//!
//! - [`schema`]: table and column metadata reported by the catalog
//! - [`value`]: dynamic row values and JSON conversion
//! - [`traits`]: the [`TargetStore`] collaborator
//! - [`identifier`]: identifier validation and quoting

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{Column, ColumnKind, TableSchema};
pub use traits::TargetStore;
pub use value::{row, row_matches, Row, SqlValue};
