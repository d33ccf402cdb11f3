//! MySQL/MariaDB SQL dialect (Strategy pattern).
//!
//! Builds the parameterized statements [`super::MysqlStore`] executes. Every
//! identifier is validated and backtick-quoted; every value is a `?`
//! placeholder bound by the caller in column order.

use crate::core::identifier::quote_mysql;
use crate::error::Result;

/// MySQL/MariaDB dialect implementation.
///
/// Compatible with MySQL 5.7+, 8.0+, and MariaDB 10.2+.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    pub fn name(&self) -> &str {
        "mysql"
    }

    /// Quote an identifier with backticks, doubling embedded backticks.
    pub fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mysql(name)
    }

    fn quote_list(&self, columns: &[String]) -> Result<Vec<String>> {
        columns.iter().map(|c| self.quote_ident(c)).collect()
    }

    /// `WHERE` clause over `filter` columns using NULL-safe equality, or an
    /// empty string when there are no filter columns.
    fn where_clause(&self, filter: &[String]) -> Result<String> {
        if filter.is_empty() {
            return Ok(String::new());
        }
        let conditions = filter
            .iter()
            .map(|c| Ok(format!("{} <=> ?", self.quote_ident(c)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(" WHERE {}", conditions.join(" AND ")))
    }

    /// `SELECT cols FROM table WHERE ...`; all columns when `columns` is empty.
    pub fn build_select(&self, table: &str, columns: &[String], filter: &[String]) -> Result<String> {
        let cols = if columns.is_empty() {
            "*".to_string()
        } else {
            self.quote_list(columns)?.join(", ")
        };
        Ok(format!(
            "SELECT {} FROM {}{}",
            cols,
            self.quote_ident(table)?,
            self.where_clause(filter)?
        ))
    }

    /// Single-row `INSERT`.
    pub fn build_insert(&self, table: &str, columns: &[String]) -> Result<String> {
        if columns.is_empty() {
            return Ok(format!("INSERT INTO {} () VALUES ()", self.quote_ident(table)?));
        }
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_ident(table)?,
            self.quote_list(columns)?.join(", "),
            vec!["?"; columns.len()].join(", ")
        ))
    }

    /// Single-row `INSERT ... ON DUPLICATE KEY UPDATE`.
    ///
    /// Non-key columns overwrite unconditionally, except those in `fill_only`,
    /// which only replace a NULL or empty existing value. A row made only of
    /// key columns becomes `INSERT IGNORE`; a table without a primary key gets
    /// a plain insert.
    pub fn build_upsert(
        &self,
        table: &str,
        columns: &[String],
        pk_columns: &[String],
        fill_only: &[String],
    ) -> Result<String> {
        let insert = self.build_insert(table, columns)?;
        if pk_columns.is_empty() {
            return Ok(insert);
        }

        let non_pk_cols: Vec<&String> = columns.iter().filter(|c| !pk_columns.contains(c)).collect();
        if non_pk_cols.is_empty() {
            return Ok(insert.replacen("INSERT INTO", "INSERT IGNORE INTO", 1));
        }

        let update_set = non_pk_cols
            .iter()
            .map(|c| {
                let q = self.quote_ident(c)?;
                Ok(if fill_only.contains(c) {
                    format!(
                        "{q} = IF({q} IS NULL OR CAST({q} AS CHAR) = '', VALUES({q}), {q})",
                        q = q
                    )
                } else {
                    format!("{q} = VALUES({q})", q = q)
                })
            })
            .collect::<Result<Vec<_>>>()?
            .join(", ");

        Ok(format!("{} ON DUPLICATE KEY UPDATE {}", insert, update_set))
    }

    /// `UPDATE table SET ... WHERE ...`; parameters bind set values first.
    pub fn build_update(&self, table: &str, set: &[String], filter: &[String]) -> Result<String> {
        let assignments = set
            .iter()
            .map(|c| Ok(format!("{} = ?", self.quote_ident(c)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!(
            "UPDATE {} SET {}{}",
            self.quote_ident(table)?,
            assignments.join(", "),
            self.where_clause(filter)?
        ))
    }

    /// `DELETE FROM table WHERE ...`.
    pub fn build_delete(&self, table: &str, filter: &[String]) -> Result<String> {
        Ok(format!(
            "DELETE FROM {}{}",
            self.quote_ident(table)?,
            self.where_clause(filter)?
        ))
    }
}
