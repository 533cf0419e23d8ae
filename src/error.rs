/// Engine-level errors
///
/// Callers of the pool loader and sequence allocator see a small, stable set
/// of error kinds; internal retry and backoff never leak out as errors of
/// their own.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Invalid criteria: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] redis::RedisError),

    #[error("Write conflict on {0}")]
    StoreConflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Catalog unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Cleanup failed for room {0}")]
    CleanupFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
