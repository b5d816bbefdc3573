//! Error handling for the incident service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use common::{ErrorInfo, ErrorResponse};
use errors::ServiceError;
use thiserror::Error;

use crate::remote_client::FetchError;

pub type Result<T> = std::result::Result<T, IncsrvError>;

#[derive(Error, Debug)]
pub enum IncsrvError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// CSV or chart rendering failed
    #[error("Report error: {0}")]
    ReportError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IncsrvError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Fetch(_) => StatusCode::BAD_GATEWAY,
            Self::ConfigError(_)
            | Self::DatabaseError(_)
            | Self::ReportError(_)
            | Self::Io(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for IncsrvError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Sqlite(e) => Self::DatabaseError(e),
            ServiceError::Io(e) => Self::Io(e),
            ServiceError::Configuration(_)
            | ServiceError::InvalidConfig { .. }
            | ServiceError::MissingConfig(_) => Self::ConfigError(err.to_string()),
            ServiceError::NotFound { resource } => Self::NotFound(resource),
            ServiceError::BadRequest(msg) | ServiceError::Validation(msg) => Self::BadRequest(msg),
            other => Self::InternalError(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for IncsrvError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<csv::Error> for IncsrvError {
    fn from(err: csv::Error) -> Self {
        Self::ReportError(format!("csv: {}", err))
    }
}

impl From<image::ImageError> for IncsrvError {
    fn from(err: image::ImageError) -> Self {
        Self::ReportError(format!("png: {}", err))
    }
}

impl IntoResponse for IncsrvError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        // Internal details stay in the log
        let message = match &self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::Io(_) => "IO error".to_string(),
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            success: false,
            error: ErrorInfo::new(message).with_code(status.as_u16()),
        };

        (status, Json(body)).into_response()
    }
}
