//! Error types for pgscan.
//!
//! Wire and literal failures come from [`PgError`]; everything above the
//! wire (casting, configuration, unsupported host features) lives here.

use thiserror::Error;

use crate::pg::PgError;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Pg(#[from] PgError),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not supported: {0}")]
    Unsupported(String),

    /// A programming gap, e.g. a filter variant with no SQL rendering.
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScanError {
    pub(crate) fn conversion(text: &str, target: impl std::fmt::Display) -> Self {
        ScanError::Conversion(format!("Could not convert \"{}\" to {}", text, target))
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
