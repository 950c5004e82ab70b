//! Example consumer: serves the models in `CONFIG_PATH` as REST resources.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Records live in memory unless `DATABASE_URL` is set, in which case tables are created in
//! the `RESTFUL_SCHEMA` schema and records live in PostgreSQL.

use restful_models::{
    apply_migrations, common_routes, db_schema, ensure_database_exists, load_from_dir, resolve,
    resource_routes, AppState, MemorySource, PgSource, Repository, Source,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("restful_models=info")),
        )
        .init();

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "example_consumer/config".into());
    let config = load_from_dir(&config_path).await?;
    let catalog = resolve(&config)?;

    let source: Arc<dyn Source> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            ensure_database_exists(&database_url).await?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await?;
            let schema = db_schema();
            apply_migrations(&pool, &catalog, &schema).await?;
            Arc::new(PgSource::new(pool, schema))
        }
        Err(_) => {
            tracing::info!("DATABASE_URL not set, keeping records in memory");
            Arc::new(MemorySource::new())
        }
    };

    let state = AppState::new(Repository::new(catalog, source))?;
    let app = common_routes(state.clone()).merge(resource_routes(state));

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Example consumer listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
