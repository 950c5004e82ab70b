//! How the remote source reaches a resource API: over the network, or straight into an
//! in-process router.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request};
use axum::Router;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tower::ServiceExt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Path below the source's base url, starting with `/`.
    pub path: String,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>, body: Value) -> Self {
        HttpRequest {
            method,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// Status and decoded JSON body. Bodies that are empty or not JSON come back as null.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or(Value::Null)
}

/// Failures are transport messages; the source wraps them in a model error.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, base: &str, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// Network transport over `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(ReqwestTransport { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        ReqwestTransport { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, base: &str, request: HttpRequest) -> Result<HttpResponse, String> {
        let url = format!("{}{}", base.trim_end_matches('/'), request.path);
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes()).map_err(|e| e.to_string())?;
        tracing::debug!(method = %request.method, url = %url, "http request");
        let mut builder = self.client.request(method, &url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(HttpResponse {
            status,
            body: decode_body(&bytes),
        })
    }
}

/// In-process transport: requests go through `tower::ServiceExt::oneshot` on a router.
#[derive(Clone)]
pub struct RouterTransport {
    router: Router,
}

impl RouterTransport {
    pub fn new(router: Router) -> Self {
        RouterTransport { router }
    }
}

#[async_trait]
impl Transport for RouterTransport {
    async fn send(&self, base: &str, request: HttpRequest) -> Result<HttpResponse, String> {
        let uri = format!("{}{}", base.trim_end_matches('/'), request.path);
        tracing::debug!(method = %request.method, url = %uri, "oneshot request");
        let mut builder = Request::builder().method(request.method.as_str()).uri(uri);
        let body = match &request.body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(body).map_err(|e| e.to_string())?)
            }
            None => Body::empty(),
        };
        let request = builder.body(body).map_err(|e| e.to_string())?;
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| e.to_string())?;
        Ok(HttpResponse {
            status,
            body: decode_body(&bytes),
        })
    }
}
