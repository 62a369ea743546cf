//! Record store errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} record not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("{kind} record ids exhausted")]
    IdsExhausted { kind: &'static str },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}
