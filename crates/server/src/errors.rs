use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use converse_core::InvokeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error("Invalid request body: {0}")]
    BadRequest(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
    pub retryable: bool,
    pub attempts: u32,
}

impl ApiError {
    /// Returns the appropriate HTTP status code for this error
    pub fn http_status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Invoke(err) => match err {
                InvokeError::Validation(_) => 400,
                InvokeError::ContentFetch { .. } => 422,
                InvokeError::TokenLimit { .. } => 413,
                InvokeError::Provider {
                    retryable: true, ..
                } => 503,
                InvokeError::Provider { .. } => 502,
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Invoke(err) => err.is_retryable(),
            ApiError::BadRequest(_) => false,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        let (code, attempts) = match self {
            ApiError::Invoke(err) => (err.code().to_string(), err.attempts()),
            ApiError::BadRequest(_) => ("BadRequest".to_string(), 0),
        };
        ErrorBody {
            error: self.to_string(),
            code,
            retryable: self.is_retryable(),
            attempts,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_body())).into_response()
    }
}
