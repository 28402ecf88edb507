use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage full: {0}")]
    StorageFull(String),

    #[error("Invalid path component: {0}")]
    InvalidPath(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Folds an IO error, surfacing out-of-space conditions distinctly so
    /// callers can trigger cleanup and return a retryable response.
    pub fn from_io(err: std::io::Error, context: &str) -> Self {
        if err.kind() == std::io::ErrorKind::StorageFull {
            StorageError::StorageFull(format!("{}: {}", context, err))
        } else {
            StorageError::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
