use accessilist_core::rate_limit::RateLimitError;
use accessilist_core::store::{now_ms, StoreError};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Response body shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub success: bool,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Envelope {
    pub fn ok(data: Option<Value>, message: Option<&str>) -> Self {
        Self {
            success: true,
            timestamp: now_ms(),
            data,
            message: message.map(str::to_string),
        }
    }

    pub fn failure(message: String) -> Self {
        Self {
            success: false,
            timestamp: now_ms(),
            data: None,
            message: Some(message),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(key) => ApiError::NotFound(format!("Session not found: {}", key)),
            StoreError::InvalidKey(key) => {
                ApiError::BadRequest(format!("Invalid session key: {}", key))
            }
            StoreError::AlreadyExists(key) => {
                ApiError::BadRequest(format!("Session already exists: {}", key))
            }
            err @ (StoreError::Io(_) | StoreError::Serde(_)) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Limited { retry_after_secs } => {
                ApiError::RateLimited { retry_after_secs }
            }
            RateLimitError::Io(err) => ApiError::Internal(format!("Rate limit storage: {}", err)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let mut resp = (status, Json(Envelope::failure(self.to_string()))).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            resp.headers_mut()
                .insert("retry-after", HeaderValue::from(retry_after_secs));
        }
        resp
    }
}
