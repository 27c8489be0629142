use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Collection '{collection}' has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("State error: {0}")]
    State(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Indexing already in progress")]
    IndexerBusy,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    /// Process exit code for errors that abort startup.
    /// 0 success, 1 configuration, 2 fatal state, 3 unrecoverable vector store.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Configuration(_) | AppError::DimensionMismatch { .. } => 1,
            AppError::State(_) | AppError::Io(_) | AppError::Serde(_) => 2,
            AppError::VectorStore(_) | AppError::Http(_) => 3,
            _ => 2,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Configuration(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::DimensionMismatch { .. } => (StatusCode::CONFLICT, self.to_string()),
            AppError::State(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::VectorStore(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Provider(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::IndexerBusy => (StatusCode::CONFLICT, self.to_string()),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            AppError::Serde(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Http(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
        };

        let body = json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
