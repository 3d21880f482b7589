//! Error types for orderflow-types crate.

use thiserror::Error;

/// Errors that can occur while encoding or decoding pipeline types.
#[derive(Error, Debug)]
pub enum TypesError {
    #[error("Protobuf encoding error: {0}")]
    Encode(String),

    #[error("Protobuf decoding error: {0}")]
    Decode(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unexpected wire type {wire_type} for field {field_number}")]
    WireType { field_number: u32, wire_type: u32 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for orderflow-types operations.
pub type Result<T> = std::result::Result<T, TypesError>;
