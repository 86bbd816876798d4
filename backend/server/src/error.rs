use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{config::ConfigError, database::StoreError, rate_limit::LimiterError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Note not found")]
    NotFound,

    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Request entity too large")]
    PayloadTooLarge,

    #[error("Invalid note id")]
    InvalidId,

    #[error("{0}")]
    Validation(&'static str),

    #[error("Too many requests, please try again later.")]
    RateLimited,

    #[error("{0}")]
    Store(StoreError),

    #[error("Internal server error")]
    Limiter(#[from] LimiterError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidId(_) => AppError::InvalidId,
            other => AppError::Store(other),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::MalformedPayload | AppError::InvalidId | AppError::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Store(_) | AppError::Limiter(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            AppError::Store(e) => error!("Internal server error: {e}"),
            AppError::Limiter(e) => error!("Ratelimiter error: {e}"),
            _ => {}
        }

        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

/// Failures that stop the server from starting.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database connection failed: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),
}
