//! Error types for Towline.

use thiserror::Error;

/// Core error type for all Towline operations.
#[derive(Error, Debug)]
pub enum TowlineError {
    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Completion timed out after {0}s")]
    CompletionTimeout(u64),

    #[error("Completion upstream error: {0}")]
    CompletionUpstream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TowlineError>;
