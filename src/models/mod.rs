mod resolution;
mod transcoding_job;
mod upload_session;
mod video;

pub use resolution::Resolution;
pub use transcoding_job::{JobStatus, TranscodingJob};
pub use upload_session::{UploadSession, UploadStatus};
pub use video::{Video, VideoStatus};
