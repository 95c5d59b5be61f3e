//! Download engine module

pub mod command;
pub mod diagnostics;
pub mod engine;
pub mod lines;
pub mod progress;
pub mod traits;

// Re-export for convenience
pub use diagnostics::{classify, ClassifiedError, ErrorKind};
pub use engine::DownloadEngine;
pub use progress::{ProgressEvent, ProgressParser, ProgressStatus};
pub use traits::{DownloadBackend, DownloadEvent, DownloadRequest};
