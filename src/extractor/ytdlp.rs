//! yt-dlp wrapper for video information probes
//!
//! A probe runs `yt-dlp --dump-json` without downloading anything, bounded by
//! a fixed timeout. Failures are classified into user-facing messages.

use crate::credentials::Credential;
use crate::downloader::command::probe_args;
use crate::downloader::diagnostics::{classify, classify_stderr_line, StderrLine};
use crate::downloader::lines::LossyLines;
use crate::extractor::models::VideoInfo;
use crate::utils::bundle_paths::{ensure_tool, YTDLP};
use crate::utils::config::{AppSettings, SettingsSource};
use crate::utils::error::MediaQueueError;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command as AsyncCommand;
use tracing::{debug, error, info, warn};

/// How long a probe may run before it is killed
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Metadata extractor using yt-dlp
#[derive(Clone)]
pub struct YtDlpExtractor {
    ytdlp_path: PathBuf,
    settings: Arc<dyn SettingsSource>,
    timeout: Duration,
}

impl std::fmt::Debug for YtDlpExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YtDlpExtractor")
            .field("ytdlp_path", &self.ytdlp_path)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl YtDlpExtractor {
    pub fn new(ytdlp_path: impl Into<PathBuf>, settings: Arc<dyn SettingsSource>) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            settings,
            timeout: PROBE_TIMEOUT,
        }
    }

    /// Extractor with a fixed settings snapshot
    pub fn with_settings(ytdlp_path: impl Into<PathBuf>, settings: AppSettings) -> Self {
        Self::new(ytdlp_path, Arc::new(settings))
    }

    /// Override the probe timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the path to yt-dlp being used
    pub fn ytdlp_path(&self) -> &Path {
        &self.ytdlp_path
    }

    /// Extract video information without downloading.
    pub async fn probe(&self, url: &str, credential: &Credential) -> Result<VideoInfo> {
        ensure_tool(&self.ytdlp_path, YTDLP)?;
        if url.trim().is_empty() {
            return Err(MediaQueueError::InvalidInput("url is empty".to_string()).into());
        }

        let settings = self.settings.current();
        let args = probe_args(url, &settings, credential);
        debug!(
            "Executing: {} {}",
            self.ytdlp_path.display(),
            args.to_strings().join(" ")
        );

        let started = Instant::now();
        let mut child = AsyncCommand::new(&self.ytdlp_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MediaQueueError::SpawnFailure { tool: YTDLP, source })?;

        let stdout_task = child.stdout.take().map(|out| tokio::spawn(read_stdout(out)));
        let stderr_task = child.stderr.take().map(|err| tokio::spawn(read_stderr(err)));

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status.map_err(MediaQueueError::from)?,
            Err(_) => {
                warn!(
                    "yt-dlp probe timed out after {:?}, killing it: {}",
                    self.timeout, url
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill yt-dlp: {}", e);
                }
                if let Some(task) = &stdout_task {
                    task.abort();
                }
                if let Some(task) = &stderr_task {
                    task.abort();
                }
                return Err(MediaQueueError::Timeout {
                    tool: YTDLP,
                    secs: self.timeout.as_secs(),
                }
                .into());
            }
        };

        let stdout = match stdout_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        info!(
            "yt-dlp probe exited with {:?} after {:?}",
            status.code(),
            started.elapsed()
        );

        if !status.success() {
            let classified = classify(&stderr);
            error!("yt-dlp probe failed ({:?}): {}", classified.kind, stderr.trim());
            return Err(MediaQueueError::ToolExitNonZero {
                code: status.code(),
                kind: Some(classified.kind),
                message: classified.message(),
            }
            .into());
        }

        let video_info: VideoInfo =
            serde_json::from_slice(&stdout).map_err(MediaQueueError::ParseFailure)?;
        info!(
            "Probe found \"{}\" with {} formats",
            video_info.title,
            video_info.formats.len()
        );

        Ok(video_info)
    }
}

async fn read_stdout<R>(mut stdout: R) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Err(e) = stdout.read_to_end(&mut buf).await {
        debug!("Stopped reading yt-dlp stdout: {}", e);
    }
    buf
}

/// Collect stderr, logging benign warnings separately from real diagnostics.
async fn read_stderr<R>(stderr: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut collected = String::new();
    let mut lines = LossyLines::new(stderr);

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                debug!("Stopped reading yt-dlp stderr: {}", e);
                break;
            }
        };
        match classify_stderr_line(&line) {
            StderrLine::Benign => debug!("yt-dlp warning (filtered): {}", line.trim()),
            _ => debug!("yt-dlp stderr: {}", line),
        }
        collected.push_str(&line);
        collected.push('\n');
    }

    collected
}
