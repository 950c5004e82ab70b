//! Example client: works with the example consumer's models through its REST API.
//!
//! Start the server (`cargo run -p example-consumer`), then `cargo run --example client`.

use restful_models::{load_from_dir, resolve, RemoteSource, Repository};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("restful_models=debug")),
        )
        .init();

    let url = std::env::var("API_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".into());
    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "example_consumer/config".into());
    let catalog = resolve(&load_from_dir(&config_path).await?)?;
    let repo = Repository::new(catalog, Arc::new(RemoteSource::connect(url)?));

    let mut unit = repo.create("unit", json!({"name": "people"}).as_object().cloned().unwrap_or_default())?;
    unit.create().await?;
    let test = unit.child(0, "test")?;
    test.add(json!({"name": "tester"}).as_object().cloned().unwrap_or_default())?;
    unit.update().await?;
    println!("unit: {}", unit.export());

    let mut tests = repo.many("test")?.filter("unit_id", unit.ids().first().cloned().unwrap_or_default());
    let labels = tests.labels().await?;
    println!("test labels: {}", serde_json::to_string(&labels)?);

    let deleted = repo.many("unit")?.filter("name", "people").delete().await?;
    println!("deleted {} unit(s)", deleted);
    Ok(())
}
