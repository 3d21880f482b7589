use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope returned by every API endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// HTTP status code, as a string
    pub code: String,
    pub message: String,
    pub data: Option<Value>,
    pub success: bool,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::OK.as_u16().to_string(),
            message: message.into(),
            data: None,
            success: true,
        }
    }

    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: status.as_u16().to_string(),
            message: message.into(),
            data: None,
            success: false,
        }
    }
}
