use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

use crate::rooms::msg::ErrorKind;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

/// Failures a caller can act on. Anything else is an internal error.
#[derive(Debug, Error)]
pub enum PokerError {
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Invalid(String),
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self.0.downcast_ref::<PokerError>() {
            Some(PokerError::Unauthorized(_)) => ErrorKind::Unauthorized,
            Some(PokerError::NotFound(_)) => ErrorKind::NotFound,
            Some(PokerError::Invalid(_)) => ErrorKind::Invalid,
            None => ErrorKind::Internal,
        }
    }

    /// Message safe to show to clients. Internal errors are not described.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "internal server error".to_owned(),
            _ => self.0.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Invalid => StatusCode::BAD_REQUEST,
            ErrorKind::Internal => {
                tracing::error!(error = ?self.0, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
