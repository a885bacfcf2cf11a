// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use thiserror::Error;
use tower::BoxError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Seek on {path:?} landed at {actual}, expected {requested}")]
    SeekMismatch {
        path: PathBuf,
        requested: u64,
        actual: u64,
    },

    #[error("Task registry poisoned: {0}")]
    Registry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Field error: {0}")]
    Field(String),

    #[error("Batch processing failed: {0}")]
    Handler(BoxError),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
