//! yt-dlp download supervisor
//!
//! Runs one `yt-dlp --newline` invocation per task, turns its stdout into
//! progress events and forwards explicit errors from stderr while it runs.

use crate::downloader::command::download_args;
use crate::downloader::diagnostics::{classify_stderr_line, StderrLine};
use crate::downloader::lines::LossyLines;
use crate::downloader::progress::ProgressParser;
use crate::downloader::traits::{DownloadBackend, DownloadEvent, DownloadRequest};
use crate::utils::bundle_paths::{ensure_tool, BinaryPaths, FFMPEG, YTDLP};
use crate::utils::config::{AppSettings, SettingsSource};
use crate::utils::error::MediaQueueError;
use anyhow::Result;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::process::Command as AsyncCommand;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Download engine backed by the yt-dlp binary
#[derive(Clone)]
pub struct DownloadEngine {
    binaries: BinaryPaths,
    settings: Arc<dyn SettingsSource>,
}

impl std::fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("binaries", &self.binaries)
            .finish()
    }
}

impl DownloadEngine {
    pub fn new(binaries: BinaryPaths, settings: Arc<dyn SettingsSource>) -> Self {
        Self { binaries, settings }
    }

    /// Engine with a fixed settings snapshot
    pub fn with_settings(binaries: BinaryPaths, settings: AppSettings) -> Self {
        Self::new(binaries, Arc::new(settings))
    }

    pub fn binaries(&self) -> &BinaryPaths {
        &self.binaries
    }

    /// Download `request`, emitting events until the process exits.
    ///
    /// There is no timeout: only `cancel` stops a running transfer.
    pub async fn run(
        &self,
        request: &DownloadRequest,
        events: mpsc::UnboundedSender<DownloadEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        ensure_tool(&self.binaries.ytdlp, YTDLP)?;
        ensure_tool(&self.binaries.ffmpeg, FFMPEG)?;

        let settings = self.settings.current();
        let args = download_args(request, &settings, &self.binaries.ffmpeg_dir());
        info!(
            task_id = %request.task_id,
            "Executing: {} {}",
            self.binaries.ytdlp.display(),
            args.to_strings().join(" ")
        );

        let mut child = AsyncCommand::new(&self.binaries.ytdlp)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MediaQueueError::SpawnFailure { tool: YTDLP, source })?;

        let stdout_task = child
            .stdout
            .take()
            .map(|stdout| tokio::spawn(pump_stdout(stdout, events.clone())));
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(pump_stderr(stderr, events.clone(), request.task_id.clone())));
        drop(events);

        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        let status = match exited {
            Some(status) => status.map_err(MediaQueueError::from)?,
            None => {
                warn!(task_id = %request.task_id, "Download cancelled, killing yt-dlp");
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill yt-dlp: {}", e);
                }
                for task in [stdout_task, stderr_task].into_iter().flatten() {
                    task.abort();
                }
                return Err(MediaQueueError::Cancelled.into());
            }
        };

        // Let the readers flush the tail of the output before reporting.
        for task in [stdout_task, stderr_task].into_iter().flatten() {
            if let Err(e) = task.await {
                debug!("Output reader ended abnormally: {}", e);
            }
        }

        if status.success() {
            info!(task_id = %request.task_id, "yt-dlp download finished");
            Ok(())
        } else {
            let code = status.code();
            warn!(task_id = %request.task_id, ?code, "yt-dlp download failed");
            Err(MediaQueueError::ToolExitNonZero {
                code,
                kind: None,
                message: format!(
                    "Download failed with code: {}",
                    MediaQueueError::exit_code_label(code)
                ),
            }
            .into())
        }
    }
}

async fn pump_stdout<R>(stdout: R, events: mpsc::UnboundedSender<DownloadEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut parser = ProgressParser::new();
    let mut lines = LossyLines::new(stdout);

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                for event in parser.feed(&line) {
                    // The receiver going away just means nobody is listening anymore.
                    let _ = events.send(DownloadEvent::Progress(event));
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!("Stopped reading yt-dlp stdout: {}", e);
                break;
            }
        }
    }
}

async fn pump_stderr<R>(stderr: R, events: mpsc::UnboundedSender<DownloadEvent>, task_id: String)
where
    R: AsyncRead + Unpin,
{
    let mut lines = LossyLines::new(stderr);

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match classify_stderr_line(&line) {
                StderrLine::Benign => debug!(%task_id, "yt-dlp warning (ignored): {}", line.trim()),
                StderrLine::Error(message) => {
                    warn!(%task_id, "yt-dlp error: {}", message);
                    let _ = events.send(DownloadEvent::Error(message));
                }
                StderrLine::Diagnostic => debug!(%task_id, "yt-dlp stderr: {}", line),
            },
            Ok(None) => break,
            Err(e) => {
                debug!("Stopped reading yt-dlp stderr: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl DownloadBackend for DownloadEngine {
    fn id(&self) -> &'static str {
        YTDLP
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        events: mpsc::UnboundedSender<DownloadEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.run(request, events, cancel).await
    }
}
