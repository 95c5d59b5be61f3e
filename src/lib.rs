//! mediaqueue library

pub mod credentials;
pub mod downloader;
pub mod extractor;
pub mod queue;
pub mod scheduler;
pub mod utils;

// Re-export main types for easier use
pub use credentials::{Credential, CredentialSource, NoCredentials, ProfileStore};
pub use downloader::{DownloadBackend, DownloadEngine, DownloadEvent, DownloadRequest, ProgressEvent};
pub use extractor::{Format, VideoInfo, YtDlpExtractor};
pub use queue::{DownloadTask, NewTask, TaskQueue, TaskStatus};
pub use scheduler::{Orchestrator, SchedulerConfig};
pub use utils::{AppSettings, MediaQueueError};
