//! Target store implementations.
//!
//! - [`mysql`]: MySQL/MariaDB over `mysql_async`
//! - [`memory`]: in-process tables for tests and dry runs
//!
//! Both implement [`crate::TargetStore`]; the engine only ever holds an
//! `Arc<dyn TargetStore>`.

pub mod memory;
pub mod mysql;

pub use memory::MemoryStore;
pub use mysql::{MysqlDialect, MysqlStore};
