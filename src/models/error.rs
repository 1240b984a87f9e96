use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde_json::json;
use serde_json::Value;
use thiserror::Error;

/// Terminal failure of one upstream request after the retry policy gave up.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{provider}: giving up on {url} after {attempts} attempts: {reason}")]
    Fatal {
        provider: String,
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("{provider}: malformed response from {url}: {reason}")]
    Malformed {
        provider: String,
        url: String,
        reason: String,
    },

    #[error("{provider}: request to {url} cancelled")]
    Cancelled { provider: String, url: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("failed to decode {collection} document: {reason}")]
    Decode { collection: String, reason: String },

    #[error("failed to encode {collection} document: {reason}")]
    Encode { collection: String, reason: String },
}

/// A single upstream field could not be mapped. The affected record is skipped.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot map {field} value {value:?}")]
pub struct MappingError {
    pub field: &'static str,
    pub value: String,
}

impl MappingError {
    pub fn new(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

impl IngestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::Fetch(FetchError::Cancelled { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            IngestError::Fetch(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("cannot read identity tables from {path}: {reason}")]
    IdentityTables { path: String, reason: String },
}

#[derive(Debug)]
pub struct Error {
    pub code: StatusCode,
    pub body: Json<Value>,
}

impl Error {
    pub fn new(code: StatusCode, message: &str) -> Self {
        Self {
            code,
            body: Json(json!({"message": message})),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.code, self.body).into_response()
    }
}

impl From<(StatusCode, &str)> for Error {
    fn from((code, msg): (StatusCode, &str)) -> Self {
        Self::new(code, msg)
    }
}
