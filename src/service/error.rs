use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures surfaced by [`LinkService`](super::LinkService).
///
/// Raw backend errors stay inside `StoreUnavailable` and are only ever logged.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("short link not found")]
    NotFound,
    #[error("could not allocate a unique short code after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },
    #[error("link store unavailable")]
    StoreUnavailable(#[source] anyhow::Error),
    #[error("authentication required")]
    AuthRequired { login_url: String },
}

impl LinkError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        LinkError::Validation {
            field,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

impl ErrorResponse {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            field: None,
        }
    }
}

impl IntoResponse for LinkError {
    fn into_response(self) -> Response {
        match self {
            LinkError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: message,
                    field: Some(field),
                }),
            )
                .into_response(),
            LinkError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("Short link not found")),
            )
                .into_response(),
            LinkError::ExhaustedRetries { .. } | LinkError::StoreUnavailable(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal server error")),
            )
                .into_response(),
            LinkError::AuthRequired { login_url } => Redirect::to(&login_url).into_response(),
        }
    }
}
