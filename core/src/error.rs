//! Error types for the content store and the noun analyzer.

use crate::ItemId;
use thiserror::Error;

/// Errors surfaced by [`crate::ContentStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced content item does not exist.
    #[error("content item {0} not found")]
    NotFound(ItemId),

    /// Caller-supplied fields were rejected.
    #[error("invalid content item: {0}")]
    Validation(String),

    /// The underlying database (and therefore the text index) cannot be used.
    #[error("index unavailable: {0}")]
    IndexUnavailable(#[from] sled::Error),

    /// A stored record could not be encoded or decoded.
    #[error("record codec error: {0}")]
    Codec(String),

    /// Text index declarations or schema version are inconsistent.
    #[error("schema error: {0}")]
    Schema(String),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}

/// Failures of a noun analyzer. The tokenizer absorbs all of these.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("analyzer timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("failed to run analyzer: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("analyzer failed: {0}")]
    Failed(String),

    #[error("malformed analyzer output: {0}")]
    Malformed(String),
}
