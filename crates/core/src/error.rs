//! Error types for the orchestration engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("key-value store error: {0}")]
    Kv(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("external HTTP call failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("call record not found: {0}")]
    CallRecordNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("workflow timed out after {0}s")]
    Timeout(u64),

    #[error("workflow cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
