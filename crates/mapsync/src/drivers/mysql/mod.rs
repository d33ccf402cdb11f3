//! MySQL/MariaDB database driver.
//!
//! - [`MysqlDialect`]: statement construction (quoting, placeholders, upsert)
//! - [`MysqlStore`]: the [`crate::TargetStore`] over a `mysql_async` pool
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod dialect;
mod store;

pub use dialect::MysqlDialect;
pub use store::MysqlStore;
