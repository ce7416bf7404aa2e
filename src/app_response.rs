use std::fmt::{Display, Formatter};

use lmdb::Error as LmdbError;
use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;

/// Outcome envelope shared by the Rust API (as the error type) and the C ABI
/// (serialized as JSON, e.g. `{"Ok":"[...]"}` or `{"NotFound":"..."}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppResponse {
    DatabaseError(String),
    SerializationError(String),
    NotFound(String),
    ValidationError(String),
    BadRequest(String),
    Unauthorized(String),
    NetworkError(String),
    Ok(String),
}

pub type AppResult<T> = Result<T, AppResponse>;

impl Display for AppResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppResponse::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppResponse::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppResponse::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppResponse::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppResponse::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppResponse::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppResponse::NetworkError(msg) => write!(f, "Network error: {}", msg),
            AppResponse::Ok(msg) => write!(f, "Ok: {}", msg),
        }
    }
}

impl std::error::Error for AppResponse {}

impl From<LmdbError> for AppResponse {
    fn from(err: LmdbError) -> Self {
        match err {
            LmdbError::NotFound => AppResponse::NotFound("Key not found in store".to_string()),
            LmdbError::Corrupted => AppResponse::DatabaseError("Store is corrupted".to_string()),
            LmdbError::MapFull => {
                AppResponse::DatabaseError("Store map size exhausted; raise the map size".to_string())
            }
            _ => AppResponse::DatabaseError(format!("LMDB error: {}", err)),
        }
    }
}

impl From<SerdeError> for AppResponse {
    fn from(err: SerdeError) -> Self {
        AppResponse::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl From<std::io::Error> for AppResponse {
    fn from(err: std::io::Error) -> Self {
        AppResponse::DatabaseError(format!("IO error: {}", err))
    }
}

impl From<reqwest::Error> for AppResponse {
    fn from(err: reqwest::Error) -> Self {
        AppResponse::NetworkError(format!("HTTP request failed: {}", err))
    }
}

impl AppResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        AppResponse::Ok(msg.into())
    }

    pub fn not_signed_in() -> Self {
        AppResponse::Unauthorized("Not signed in".to_string())
    }

    /// Same variant, message prefixed with `context`.
    pub fn context(self, context: &str) -> Self {
        match self {
            AppResponse::DatabaseError(msg) => AppResponse::DatabaseError(format!("{context}: {msg}")),
            AppResponse::SerializationError(msg) => {
                AppResponse::SerializationError(format!("{context}: {msg}"))
            }
            AppResponse::NotFound(msg) => AppResponse::NotFound(format!("{context}: {msg}")),
            AppResponse::ValidationError(msg) => {
                AppResponse::ValidationError(format!("{context}: {msg}"))
            }
            AppResponse::BadRequest(msg) => AppResponse::BadRequest(format!("{context}: {msg}")),
            AppResponse::Unauthorized(msg) => AppResponse::Unauthorized(format!("{context}: {msg}")),
            AppResponse::NetworkError(msg) => AppResponse::NetworkError(format!("{context}: {msg}")),
            AppResponse::Ok(msg) => AppResponse::Ok(msg),
        }
    }

    /// Message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            AppResponse::DatabaseError(msg)
            | AppResponse::SerializationError(msg)
            | AppResponse::NotFound(msg)
            | AppResponse::ValidationError(msg)
            | AppResponse::BadRequest(msg)
            | AppResponse::Unauthorized(msg)
            | AppResponse::NetworkError(msg)
            | AppResponse::Ok(msg) => msg,
        }
    }

    /// True for every variant except [`AppResponse::Ok`].
    pub fn is_error(&self) -> bool {
        !matches!(self, AppResponse::Ok(_))
    }
}
