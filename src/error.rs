use thiserror::Error;

/// Errors surfaced by the mediation layer and the built-in backends.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("document model cache has been disposed")]
    CacheDisposed,
    #[error("{backend} backend failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
    #[error("invalid schema {uri}: {message}")]
    Schema { uri: String, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;
