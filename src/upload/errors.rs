use crate::storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Invalid file type: {0}. Expected a video MIME type")]
    InvalidFileType(String),

    #[error("File size {0} bytes exceeds maximum of {1} bytes")]
    FileSizeExceeded(u64, u64),

    #[error("Upload session not found: {0}")]
    SessionNotFound(String),

    #[error("Upload session expired: {0}")]
    SessionExpired(String),

    #[error("Invalid chunk index: {0}")]
    InvalidChunkIndex(String),

    #[error("Chunk body is empty")]
    EmptyChunk,

    #[error("Chunk of {0} bytes exceeds maximum of {1} bytes")]
    ChunkTooLarge(usize, u64),

    #[error("Upload incomplete: {received} of {total} chunks received")]
    IncompleteUpload {
        received: usize,
        total: u32,
        missing: Vec<u32>,
    },

    #[error("Assembled file is {actual} bytes, expected {expected}")]
    SizeMismatch { actual: u64, expected: u64 },

    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("Insufficient storage: {0}")]
    StorageFull(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::StorageFull(msg) => UploadError::StorageFull(msg),
            other => UploadError::Storage(other.to_string()),
        }
    }
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        UploadError::from(StorageError::from_io(err, "upload io"))
    }
}
