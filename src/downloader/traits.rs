use crate::credentials::Credential;
use crate::downloader::progress::ProgressEvent;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Everything one download invocation needs
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRequest {
    pub task_id: String,
    pub url: String,
    /// Directory the output template is anchored in
    pub output_dir: PathBuf,
    pub format: Option<String>,
    pub audio_only: bool,
    pub credential: Credential,
}

/// Side-channel events emitted while a download runs
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Progress(ProgressEvent),
    /// An explicit `ERROR` line from the tool
    Error(String),
}

/// Core trait for download executors
///
/// The scheduler only talks to this seam, so the yt-dlp engine can be swapped
/// for a scripted backend in tests.
#[async_trait]
pub trait DownloadBackend: Send + Sync {
    /// Returns a unique identifier for this backend (e.g. "yt-dlp")
    fn id(&self) -> &'static str;

    /// Run one download to completion.
    ///
    /// Events go to `events` as they happen. When `cancel` fires the
    /// invocation must stop and return `MediaQueueError::Cancelled`.
    async fn download(
        &self,
        request: &DownloadRequest,
        events: mpsc::UnboundedSender<DownloadEvent>,
        cancel: CancellationToken,
    ) -> Result<()>;
}
