//! Core error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid quantity for {field}: '{value}'")]
    InvalidQuantity { field: String, value: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
