//! Shared helpers for the integration tests: a scripted download backend and
//! polling utilities. No external tools or network are involved.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use mediaqueue::downloader::{DownloadBackend, DownloadEvent, DownloadRequest, ProgressEvent};
use mediaqueue::queue::TaskQueue;
use mediaqueue::scheduler::{Orchestrator, SchedulerConfig};
use mediaqueue::{CredentialSource, MediaQueueError, NoCredentials};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// What one invocation for a url does
#[derive(Debug, Clone)]
pub enum Script {
    /// Report some progress, then exit 0
    Succeed,
    /// Exit with the given code
    Fail(i32),
    /// Print an `ERROR` line and keep running until cancelled
    StreamError(String),
    /// Run until cancelled
    Hang,
    /// Take this long, then succeed
    Slow(Duration),
}

/// Backend replaying per-url scripts. Urls without a script succeed.
#[derive(Default)]
pub struct MockBackend {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    requests: Mutex<Vec<DownloadRequest>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue scripts for consecutive invocations of `url`.
    pub fn script(&self, url: &str, scripts: impl IntoIterator<Item = Script>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .extend(scripts);
    }

    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Urls in the order their downloads started
    pub fn started_urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn next_script(&self, url: &str) -> Script {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Script::Succeed)
    }
}

#[async_trait]
impl DownloadBackend for MockBackend {
    fn id(&self) -> &'static str {
        "mock"
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        events: mpsc::UnboundedSender<DownloadEvent>,
        cancel: CancellationToken,
    ) -> Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);

        let result = match self.next_script(&request.url) {
            Script::Succeed => {
                for percent in [25.0, 50.0, 75.0] {
                    let _ = events.send(DownloadEvent::Progress(ProgressEvent::downloading(percent)));
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
                let _ = events.send(DownloadEvent::Progress(ProgressEvent::completed()));
                Ok(())
            }
            Script::Fail(code) => {
                let _ = events.send(DownloadEvent::Progress(ProgressEvent::downloading(10.0)));
                Err(MediaQueueError::ToolExitNonZero {
                    code: Some(code),
                    kind: None,
                    message: format!("Download failed with code: {code}"),
                }
                .into())
            }
            Script::StreamError(line) => {
                let _ = events.send(DownloadEvent::Error(line));
                cancel.cancelled().await;
                Err(MediaQueueError::Cancelled.into())
            }
            Script::Hang => {
                cancel.cancelled().await;
                Err(MediaQueueError::Cancelled.into())
            }
            Script::Slow(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => Ok(()),
                    _ = cancel.cancelled() => Err(MediaQueueError::Cancelled.into()),
                }
            }
        };

        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        rearm_delay: Duration::from_millis(20),
        fail_on_stream_error: true,
    }
}

pub fn orchestrator_with(backend: Arc<MockBackend>) -> (Arc<TaskQueue>, Arc<Orchestrator>) {
    orchestrator_with_credentials(backend, Arc::new(NoCredentials))
}

pub fn orchestrator_with_credentials(
    backend: Arc<MockBackend>,
    credentials: Arc<dyn CredentialSource>,
) -> (Arc<TaskQueue>, Arc<Orchestrator>) {
    let queue = Arc::new(TaskQueue::new());
    let orchestrator = Orchestrator::attach(Arc::clone(&queue), backend, credentials, fast_config());
    (queue, orchestrator)
}

/// Poll `condition` until it holds, failing after 10 seconds.
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for: {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
