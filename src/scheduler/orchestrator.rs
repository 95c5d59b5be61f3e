//! Single-worker download scheduler
//!
//! Runs at most one task at a time, always picking the newest pending task,
//! and re-arms itself after each outcome.

use crate::credentials::CredentialSource;
use crate::downloader::traits::{DownloadBackend, DownloadEvent, DownloadRequest};
use crate::queue::{DownloadTask, NewTask, TaskQueue};
use crate::utils::error::MediaQueueError;
use anyhow::Result;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Scheduler tuning
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pause between one outcome and picking the next task
    pub rearm_delay: Duration,
    /// Fail the task on the first `ERROR` line instead of waiting for the exit code
    pub fail_on_stream_error: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rearm_delay: Duration::from_secs(1),
            fail_on_stream_error: true,
        }
    }
}

struct ActiveDownload {
    task_id: String,
    cancel: CancellationToken,
}

#[derive(Default)]
struct SchedulerState {
    busy: bool,
    current: Option<ActiveDownload>,
    stopped: bool,
}

/// Drives a [`TaskQueue`] through a [`DownloadBackend`]
pub struct Orchestrator {
    queue: Arc<TaskQueue>,
    backend: Arc<dyn DownloadBackend>,
    credentials: Arc<dyn CredentialSource>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("backend", &self.backend.id())
            .field("config", &self.config)
            .field("busy", &self.is_busy())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Orchestrator {
    /// Build an orchestrator and register it as the queue's auto-start hook.
    pub fn attach(
        queue: Arc<TaskQueue>,
        backend: Arc<dyn DownloadBackend>,
        credentials: Arc<dyn CredentialSource>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        let orchestrator = Arc::new(Self {
            queue,
            backend,
            credentials,
            config,
            state: Mutex::new(SchedulerState::default()),
        });

        let weak = Arc::downgrade(&orchestrator);
        orchestrator.queue.set_auto_start(move || {
            if let Some(orchestrator) = weak.upgrade() {
                orchestrator.drive();
            }
        });
        info!(
            "Orchestrator attached with backend {}",
            orchestrator.backend.id()
        );

        orchestrator
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.state).busy
    }

    /// Id of the task currently downloading
    pub fn current_task(&self) -> Option<String> {
        lock(&self.state)
            .current
            .as_ref()
            .map(|active| active.task_id.clone())
    }

    /// Start the newest pending task unless one is already running.
    ///
    /// Must be called from within a tokio runtime. Returns whether a task was
    /// started.
    pub fn drive(self: &Arc<Self>) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("drive() called outside an async runtime");
            return false;
        };

        {
            let mut state = lock(&self.state);
            if state.stopped {
                debug!("Orchestrator is shut down");
                return false;
            }
            if state.busy {
                debug!("Orchestrator busy, not starting another task");
                return false;
            }
            state.busy = true;
        }

        // Subscribers run inside mark_downloading, so the state lock must be free.
        for task in self.queue.list_pending() {
            let cancel = CancellationToken::new();
            if !self.claim(&task.id, &cancel) {
                debug!("Orchestrator shut down before task {} started", task.id);
                return false;
            }
            if !self.queue.mark_downloading(&task.id) {
                debug!("Task {} is no longer pending", task.id);
                continue;
            }

            info!("Starting task {}: {}", task.id, task.url);
            let this = Arc::clone(self);
            handle.spawn(async move {
                this.run_task(task, cancel).await;
                this.clear_current();
                tokio::time::sleep(this.config.rearm_delay).await;
                this.drive();
            });
            return true;
        }

        debug!("No pending tasks");
        self.clear_current();
        false
    }

    async fn run_task(&self, task: DownloadTask, cancel: CancellationToken) {
        let request = DownloadRequest {
            task_id: task.id.clone(),
            url: task.url.clone(),
            output_dir: task.output_path.clone(),
            format: task.format.clone(),
            audio_only: task.audio_only,
            credential: self.credentials.resolve(&task.url),
        };

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut stream_error = None;
        let download = self
            .backend
            .download(&request, events_tx, cancel.clone());
        tokio::pin!(download);

        let result = loop {
            tokio::select! {
                result = &mut download => break result,
                Some(event) = events_rx.recv() => {
                    self.handle_event(&task.id, event, &cancel, &mut stream_error);
                }
            }
        };
        while let Ok(event) = events_rx.try_recv() {
            self.handle_event(&task.id, event, &cancel, &mut stream_error);
        }

        match (result, stream_error) {
            (_, Some(message)) => {
                error!("Task {} failed: {}", task.id, message);
                self.queue.mark_failed(&task.id, message);
            }
            (Ok(()), None) => {
                if self.queue.mark_completed(&task.id) {
                    info!("Task {} completed successfully", task.id);
                }
            }
            (Err(e), None) => {
                let cancelled = matches!(
                    e.downcast_ref::<MediaQueueError>(),
                    Some(MediaQueueError::Cancelled)
                );
                if cancelled {
                    info!("Task {} was stopped", task.id);
                } else {
                    error!("Task {} failed: {}", task.id, e);
                }
                // No-op when the user already paused or removed the task.
                self.queue.mark_failed(&task.id, e.to_string());
            }
        }
    }

    fn handle_event(
        &self,
        task_id: &str,
        event: DownloadEvent,
        cancel: &CancellationToken,
        stream_error: &mut Option<String>,
    ) {
        match event {
            DownloadEvent::Progress(progress) => {
                self.queue.set_progress(task_id, progress.percent);
            }
            DownloadEvent::Error(message) => {
                if self.config.fail_on_stream_error && stream_error.is_none() {
                    warn!("Task {} reported an error, stopping it: {}", task_id, message);
                    *stream_error = Some(message);
                    cancel.cancel();
                } else {
                    warn!("Task {} reported an error: {}", task_id, message);
                }
            }
        }
    }

    /// Record `task_id` as current, unless shutdown got in first.
    ///
    /// On shutdown the busy flag is released and nothing is recorded.
    fn claim(&self, task_id: &str, cancel: &CancellationToken) -> bool {
        let mut state = lock(&self.state);
        if state.stopped {
            state.busy = false;
            state.current = None;
            return false;
        }
        state.current = Some(ActiveDownload {
            task_id: task_id.to_string(),
            cancel: cancel.clone(),
        });
        true
    }

    fn clear_current(&self) {
        let mut state = lock(&self.state);
        state.busy = false;
        state.current = None;
    }

    /// Cancel the token of `id` if it is the running task.
    fn stop_if_current(&self, id: &str) -> bool {
        let state = lock(&self.state);
        match &state.current {
            Some(active) if active.task_id == id => {
                active.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn enqueue(&self, task: NewTask) -> Result<String> {
        self.queue.enqueue(task)
    }

    /// Stop the task if it is running and remove it from the queue.
    pub fn cancel(&self, id: &str) -> Result<DownloadTask> {
        if self.stop_if_current(id) {
            info!("Cancelling running task {}", id);
        }
        self.queue
            .remove(id)
            .ok_or_else(|| MediaQueueError::TaskNotFound(id.to_string()).into())
    }

    /// Stop the task if it is running and mark it paused.
    pub fn pause(&self, id: &str) -> Result<()> {
        self.queue.pause(id)?;
        if self.stop_if_current(id) {
            info!("Paused running task {}", id);
        }
        Ok(())
    }

    pub fn resume(self: &Arc<Self>, id: &str) -> Result<()> {
        self.queue.resume(id)?;
        self.drive();
        Ok(())
    }

    pub fn retry(self: &Arc<Self>, id: &str) -> Result<()> {
        self.queue.retry(id)?;
        self.drive();
        Ok(())
    }

    pub fn retry_all_failed(self: &Arc<Self>) -> usize {
        let count = self.queue.retry_all_failed();
        if count > 0 {
            self.drive();
        }
        count
    }

    /// Detach from the queue, stop the running task and start nothing else.
    pub fn shutdown(&self) {
        self.queue.clear_auto_start();
        let mut state = lock(&self.state);
        state.stopped = true;
        if let Some(active) = &state.current {
            info!("Shutting down, stopping task {}", active.task_id);
            active.cancel.cancel();
        }
    }
}
