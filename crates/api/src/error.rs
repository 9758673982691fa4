use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use catalog::CatalogError;
use serde::Serialize;
use thiserror::Error;
use vision::{ModelError, ValidationError};

/// Failure of one analysis request, as seen by the caller.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("invalid model reply: {0}")]
    InvalidReply(String),
}

impl AnalysisError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::InvalidReply(_) => "invalid_reply",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamUnavailable(_) | Self::InvalidReply(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<ValidationError> for AnalysisError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e.0)
    }
}

impl From<CatalogError> for AnalysisError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound { .. } => Self::NotFound(e.to_string()),
            CatalogError::InvalidKey { .. } => Self::Validation(e.to_string()),
            CatalogError::Upstream { .. } | CatalogError::Parse { .. } => {
                Self::UpstreamUnavailable(e.to_string())
            }
        }
    }
}

impl From<ModelError> for AnalysisError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::InvalidReply { message } => Self::InvalidReply(message),
            ModelError::Upstream { .. } | ModelError::Timeout(_) => {
                Self::UpstreamUnavailable(e.to_string())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
            },
        };
        (self.status(), Json(body)).into_response()
    }
}
