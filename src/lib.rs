//! restful-models: expose models as REST resources, and consume such resources as a model source.

pub mod client;
pub mod config;
pub mod criteria;
pub mod error;
pub mod extractors;
pub mod fields;
pub mod handlers;
pub mod migration;
pub mod model;
pub mod registry;
pub mod routes;
pub mod sql;
pub mod state;
pub mod store;

pub use client::{RemoteSource, ReqwestTransport, RouterTransport, Transport};
pub use config::{load_from_dir, resolve, Catalog, FullConfig};
pub use criteria::{FilterValue, Page, QuerySpec, WireRequest};
pub use error::{AppError, CodecError, ConfigError, ModelError, ResourceError};
pub use fields::{FieldDescriptor, ResourceDefinition};
pub use migration::apply_migrations;
pub use model::{Model, Repository, Source};
pub use registry::Registry;
pub use routes::{common_routes, resource_routes};
pub use state::AppState;
pub use store::{db_schema, ensure_database_exists, MemorySource, PgSource};
