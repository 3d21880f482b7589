use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orderflow_core::PublishError;
use thiserror::Error;

use crate::response::ApiResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The request was rejected before anything was published.
    #[error("{0}")]
    Validation(String),

    #[error("Internal Server Error : {0}")]
    Publish(#[from] PublishError),

    #[error("Internal Server Error : {0}")]
    Encode(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Publish(_) | ApiError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ApiResponse::failure(status, self.to_string()))).into_response()
    }
}
