//! Admin API errors.
//!
//! Every failure leaves the admin boundary as `{"error": {"code", "message"}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::settings::SettingsError;
use crate::store::{MappingError, StoreError};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl AdminError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<StoreError> for AdminError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Admin storage error");
        Self::Internal("storage error".to_string())
    }
}

impl From<MappingError> for AdminError {
    fn from(err: MappingError) -> Self {
        match err {
            MappingError::InvalidSubdomain(_)
            | MappingError::UnresolvableResource(_)
            | MappingError::InvalidUrl(_)
            | MappingError::InvalidKind(_) => Self::BadRequest(err.to_string()),
            MappingError::Conflict(_) => Self::Conflict(err.to_string()),
            MappingError::NotFound(id) => Self::NotFound(format!("mapping {id}")),
            MappingError::Store(e) => e.into(),
        }
    }
}

impl From<SettingsError> for AdminError {
    fn from(err: SettingsError) -> Self {
        match err {
            SettingsError::InvalidRule => Self::BadRequest(err.to_string()),
            SettingsError::RuleIndex(i) => Self::NotFound(format!("redirect rule {i}")),
            SettingsError::Store(e) => e.into(),
        }
    }
}
