//! 统一的 API 错误类型与 JSON 错误信封。

use axum::Json;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use std::io::ErrorKind;

use crate::dto::ErrorEnvelope;
use crate::storage::StorageError;

#[derive(Debug)]
pub enum ApiError {
    MissingFile,
    InvalidType,
    BadRequest(String),
    NotFound,
    AccessDenied,
    StorageFailure { context: &'static str, detail: String },
    RouteNotFound { path: String, method: Method },
}

impl ApiError {
    pub fn storage(context: &'static str, err: impl ToString) -> Self {
        ApiError::StorageFailure {
            context,
            detail: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile | ApiError::InvalidType | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound | ApiError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::AccessDenied => StatusCode::FORBIDDEN,
            ApiError::StorageFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::MissingFile => "MissingFile",
            ApiError::InvalidType => "InvalidType",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::NotFound => "NotFound",
            ApiError::AccessDenied => "AccessDenied",
            ApiError::StorageFailure { .. } => "StorageFailure",
            ApiError::RouteNotFound { .. } => "RouteNotFound",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let envelope = match self {
            ApiError::MissingFile => ErrorEnvelope::new(kind, "No file uploaded"),
            ApiError::InvalidType => ErrorEnvelope::new(kind, "Only CSV files are allowed"),
            ApiError::BadRequest(msg) => ErrorEnvelope::new(kind, msg),
            ApiError::NotFound => ErrorEnvelope::new(kind, "File not found"),
            ApiError::AccessDenied => ErrorEnvelope::new(kind, "Access denied"),
            ApiError::StorageFailure { context, detail } => {
                ErrorEnvelope::new(kind, context).with_message(detail)
            }
            ApiError::RouteNotFound { path, method } => ErrorEnvelope {
                path: Some(path),
                method: Some(method.to_string()),
                ..ErrorEnvelope::new(kind, "Not found")
            },
        };
        (status, Json(envelope)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidPath => ApiError::AccessDenied,
            StorageError::RootUnavailable(err) => {
                ApiError::storage("Storage directory unavailable", err)
            }
            StorageError::Io(err) => match err.kind() {
                ErrorKind::NotFound => ApiError::NotFound,
                _ => ApiError::storage("Storage operation failed", err),
            },
        }
    }
}
