//! Shared application state for all routes.

use crate::error::AppError;
use crate::model::Repository;
use crate::registry::Registry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub repo: Repository,
    pub registry: Arc<Registry>,
}

impl AppState {
    /// Binds a resource for every declared resource and every remaining model.
    pub fn new(repo: Repository) -> Result<Self, AppError> {
        let registry = Registry::from_catalog(repo.catalog())?;
        Ok(AppState {
            repo,
            registry: Arc::new(registry),
        })
    }
}
