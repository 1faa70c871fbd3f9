use argon2::Error as Argon2Error;
use serde_json::Error as JsonError;
use std::io::Error as IoError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the storage layer and the primitives underneath the
/// domain components. Domain-level rejections live in the component error
/// types, which wrap this one.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Json(#[from] JsonError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Corrupt store: {0}")]
    Corrupt(String),
}
