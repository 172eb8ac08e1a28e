//! JSON error bodies for the HTTP front end.
//!
//! A refused start is not an error here: it answers with its own
//! `StartResponse`. These are the cases where no answer came back at all.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// The coordinator task is gone or dropped the request.
    #[error("{0}")]
    CoordinatorUnavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::CoordinatorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": true,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::CoordinatorUnavailable(format!("{err:#}"))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
