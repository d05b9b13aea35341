use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SymdexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("indexer is disposed")]
    IndexerDisposed,
    #[error("invalid document for {path}: {reason}")]
    InvalidDocument { path: String, reason: String },
    #[error("analyzer failed on {path}: {reason}")]
    AnalyzerFailure { path: PathBuf, reason: String },
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("malformed query: {0}")]
    MalformedQuery(String),
    #[error("watch error: {0}")]
    Watch(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SymdexError>;
