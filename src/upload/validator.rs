use super::errors::UploadError;
use tracing::warn;

/// FileValidator validates upload metadata before a session is opened
pub struct FileValidator;

impl FileValidator {
    /// Validates MIME type: anything under video/* is accepted
    pub fn validate_mime_type(mime_type: &str) -> Result<(), UploadError> {
        if mime_type.starts_with("video/") {
            return Ok(());
        }
        warn!("Rejected MIME type: {}", mime_type);
        Err(UploadError::InvalidFileType(mime_type.to_string()))
    }

    /// Validates declared file size against the configured maximum
    pub fn validate_file_size(size: u64, max_size: u64) -> Result<(), UploadError> {
        if size == 0 || size > max_size {
            return Err(UploadError::FileSizeExceeded(size, max_size));
        }
        Ok(())
    }

    /// Validates filename: non-empty, bounded, no path traversal
    pub fn validate_filename(filename: &str) -> Result<(), UploadError> {
        if filename.trim().is_empty() {
            return Err(UploadError::InvalidFilename(
                "Filename cannot be empty".to_string(),
            ));
        }

        if filename.len() > 255 {
            return Err(UploadError::InvalidFilename(
                "Filename cannot exceed 255 characters".to_string(),
            ));
        }

        if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
            return Err(UploadError::InvalidFilename(
                "Filename contains invalid characters".to_string(),
            ));
        }

        Ok(())
    }
}
