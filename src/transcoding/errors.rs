use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranscodingError {
    #[error("Encoder not available: {0}")]
    EncoderUnavailable(String),

    #[error("Encoder exited with status {code}: {detail}")]
    EncoderFailed { code: i32, detail: String },

    #[error("Could not determine input duration for {0}")]
    UnknownDuration(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TranscodingError>;
