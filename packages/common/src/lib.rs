pub mod config;
pub mod progress;
pub mod upload_status;

pub use config::UploadConfig;
pub use progress::{FrameType, ProgressData, ProgressFrame, RecentRow, StreamStatus};
pub use upload_status::{RowStatus, UploadStatus};
