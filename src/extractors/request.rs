//! Extract query pairs and the JSON body of a resource request.

use crate::criteria::WireRequest;
use crate::error::{AppError, CodecError};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{FromRequest, Query, Request},
    http::header::CONTENT_TYPE,
};
use serde_json::{Map, Value};

fn is_json(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let mime = ct.split(';').next().unwrap_or("").trim();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false)
}

/// Bodies that are not declared JSON are ignored, as are empty ones.
#[async_trait]
impl<S> FromRequest<S> for WireRequest
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let query = match req.uri().query() {
            Some(_) => {
                Query::<Vec<(String, String)>>::try_from_uri(req.uri())
                    .map_err(|e| AppError::BadRequest(e.body_text()))?
                    .0
            }
            None => Vec::new(),
        };
        let json = is_json(&req);
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        let body = if json && !bytes.iter().all(u8::is_ascii_whitespace) {
            match serde_json::from_slice::<Value>(&bytes).map_err(CodecError::Body)? {
                Value::Object(map) => map,
                Value::Null => Map::new(),
                _ => {
                    return Err(AppError::BadRequest(
                        "request body must be a JSON object".into(),
                    ))
                }
            }
        } else {
            Map::new()
        };
        Ok(WireRequest::new(query, body))
    }
}
