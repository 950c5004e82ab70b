//! Record stores behind the [`Source`](crate::model::Source) trait.

pub mod matcher;
pub mod memory;
pub mod postgres;

pub use memory::MemorySource;
pub use postgres::{db_schema, ensure_database_exists, PgSource};
