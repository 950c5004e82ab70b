//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate model: {0}")]
    DuplicateModel(String),
    #[error("unknown field: {model}.{field}")]
    UnknownField { model: String, field: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Failure while building a resource definition, displayed `"{resource}: {message}"`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{resource}: {message}")]
pub struct ResourceError {
    pub resource: String,
    pub message: String,
}

impl ResourceError {
    pub fn new(resource: impl Into<String>, message: impl Into<String>) -> Self {
        ResourceError {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

/// Failure raised by a model operation, displayed `"{model}: {message}"`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{model}: {message}")]
pub struct ModelError {
    pub model: String,
    pub message: String,
}

impl ModelError {
    pub fn new(model: impl Into<String>, message: impl Into<String>) -> Self {
        ModelError {
            model: model.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.message.contains("none retrieved")
    }
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid literal for limit {key}: {value}")]
    InvalidLimit {
        key: String,
        #[source]
        source: std::num::ParseIntError,
        value: String,
    },
    #[error("malformed {key}: {message}")]
    Malformed { key: &'static str, message: String },
    #[error("malformed body: {0}")]
    Body(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("{0}")]
    BadRequest(String),
    /// Unknown resource segment, or an id route on a model without identity.
    #[error("no route")]
    NoRoute,
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

impl AppError {
    pub fn model(model: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Model(ModelError::new(model, message))
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

/// Renders the error and every `source()` below it, one per line.
pub fn traceback(err: &(dyn std::error::Error + 'static)) -> String {
    let mut lines = vec![format!("{:?}", err)];
    let mut current = err.source();
    while let Some(cause) = current {
        lines.push(format!("caused by: {}", cause));
        current = cause.source();
    }
    lines.join("\n")
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, traced) = match &self {
            AppError::NoRoute => return StatusCode::NOT_FOUND.into_response(),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, false),
            AppError::Model(e) if e.is_not_found() => (StatusCode::NOT_FOUND, false),
            AppError::Model(_) => (StatusCode::INTERNAL_SERVER_ERROR, false),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, true),
        };
        let message = self.to_string();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = ?self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), message = %message, "request rejected");
        }
        let body = ErrorBody {
            traceback: traced.then(|| traceback(&self)),
            message,
        };
        (status, Json(body)).into_response()
    }
}
