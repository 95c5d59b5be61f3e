//! Download task queue
//!
//! Owns every task and its lifecycle. Mutations are synchronous; subscribers
//! receive a full snapshot after each one, outside the internal lock and in
//! the order the mutations happened.

use crate::utils::error::MediaQueueError;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retries allowed per task unless the caller says otherwise
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay between an enqueue and the auto-start hook firing
pub const AUTO_START_DELAY: Duration = Duration::from_millis(100);

/// Task status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Downloading,
    Completed,
    Failed,
    Paused,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Download task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTask {
    pub id: String,
    pub url: String,
    pub title: String,
    /// Directory the file is written into
    pub output_path: PathBuf,
    pub format: Option<String>,
    pub audio_only: bool,
    pub status: TaskStatus,
    pub progress: f64,
    pub error: Option<String>,
    pub added_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl DownloadTask {
    pub fn can_retry(&self) -> bool {
        self.status == TaskStatus::Failed && self.retry_count < self.max_retries
    }
}

/// Input for [`TaskQueue::enqueue`]
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub url: String,
    pub title: String,
    pub output_path: PathBuf,
    pub format: Option<String>,
    pub audio_only: bool,
    pub max_retries: Option<u32>,
}

impl NewTask {
    pub fn new(url: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        let url = url.into();
        Self {
            title: url.clone(),
            url,
            output_path: output_path.into(),
            ..Default::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn audio_only(mut self, audio_only: bool) -> Self {
        self.audio_only = audio_only;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Partial update merged into a task by [`TaskQueue::update`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
    pub progress: Option<f64>,
    pub error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn progress(progress: f64) -> Self {
        Self {
            progress: Some(progress),
            ..Default::default()
        }
    }
}

type Listener = Arc<dyn Fn(&[DownloadTask]) + Send + Sync>;
type AutoStart = Arc<dyn Fn() + Send + Sync>;
type ListenerList = Mutex<Vec<(u64, Listener)>>;

/// Handle returned by [`TaskQueue::subscribe`]
///
/// Dropping the handle keeps the listener attached; call
/// [`Subscription::unsubscribe`] to detach it.
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerList>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// In-memory task queue
pub struct TaskQueue {
    // Insertion order; `list_all` sorts a copy.
    tasks: Mutex<Vec<DownloadTask>>,
    listeners: Arc<ListenerList>,
    next_listener: AtomicU64,
    outbox: Mutex<Outbox>,
    auto_start: Mutex<Option<AutoStart>>,
}

/// Snapshots waiting for delivery, in mutation order
#[derive(Default)]
struct Outbox {
    pending: VecDeque<Vec<DownloadTask>>,
    delivering: bool,
}

/// Clears the delivering flag if a listener panics mid-flush.
struct FlushGuard<'a> {
    outbox: &'a Mutex<Outbox>,
    armed: bool,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            lock(self.outbox).delivering = false;
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("tasks", &lock(&self.tasks).len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn sorted_snapshot(tasks: &[DownloadTask]) -> Vec<DownloadTask> {
    let mut snapshot = tasks.to_vec();
    // Stable sort keeps insertion order among equal timestamps.
    snapshot.sort_by(|a, b| b.added_at.cmp(&a.added_at));
    snapshot
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_listener: AtomicU64::new(0),
            outbox: Mutex::new(Outbox::default()),
            auto_start: Mutex::new(None),
        }
    }

    /// Add a task in `Pending` state and return its id.
    pub fn enqueue(&self, new_task: NewTask) -> Result<String> {
        if new_task.url.trim().is_empty() {
            return Err(MediaQueueError::InvalidInput("url is empty".to_string()).into());
        }
        if new_task.output_path.as_os_str().is_empty() {
            return Err(MediaQueueError::InvalidInput("output path is empty".to_string()).into());
        }

        let task = DownloadTask {
            id: uuid::Uuid::new_v4().to_string(),
            title: if new_task.title.is_empty() {
                new_task.url.clone()
            } else {
                new_task.title
            },
            url: new_task.url,
            output_path: new_task.output_path,
            format: new_task.format,
            audio_only: new_task.audio_only,
            status: TaskStatus::Pending,
            progress: 0.0,
            error: None,
            added_at: Utc::now(),
            completed_at: None,
            retry_count: 0,
            max_retries: new_task.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
        };
        let id = task.id.clone();
        info!("Added task {} to queue: {}", id, task.url);

        {
            let mut tasks = lock(&self.tasks);
            tasks.push(task);
            self.stage(&tasks);
        }
        self.flush();
        self.schedule_auto_start();

        Ok(id)
    }

    /// Merge `update` into a task. Returns `false` when nothing was applied.
    pub fn update(&self, id: &str, update: TaskUpdate) -> bool {
        self.update_if(id, |_| true, update)
    }

    /// Move a pending task into `Downloading`.
    pub fn mark_downloading(&self, id: &str) -> bool {
        self.update_if(
            id,
            |task| task.status == TaskStatus::Pending,
            TaskUpdate::status(TaskStatus::Downloading),
        )
    }

    pub fn set_progress(&self, id: &str, progress: f64) -> bool {
        self.update_if(id, is_downloading, TaskUpdate::progress(progress))
    }

    pub fn mark_completed(&self, id: &str) -> bool {
        self.update_if(id, is_downloading, TaskUpdate::status(TaskStatus::Completed))
    }

    pub fn mark_failed(&self, id: &str, message: impl Into<String>) -> bool {
        let update = TaskUpdate {
            status: Some(TaskStatus::Failed),
            error: Some(message.into()),
            ..Default::default()
        };
        self.update_if(id, is_downloading, update)
    }

    fn update_if<P>(&self, id: &str, precondition: P, update: TaskUpdate) -> bool
    where
        P: FnOnce(&DownloadTask) -> bool,
    {
        {
            let mut tasks = lock(&self.tasks);
            let Some(index) = tasks.iter().position(|t| t.id == id) else {
                debug!("Ignoring update for unknown task {}", id);
                return false;
            };
            if !precondition(&tasks[index]) {
                debug!(
                    "Ignoring update for task {} in state {}",
                    id, tasks[index].status
                );
                return false;
            }
            if update.status == Some(TaskStatus::Downloading)
                && tasks
                    .iter()
                    .any(|t| t.id != id && t.status == TaskStatus::Downloading)
            {
                warn!("Refusing to start task {}: another task is downloading", id);
                return false;
            }
            apply_update(&mut tasks[index], update);
            self.stage(&tasks);
        }
        self.flush();
        true
    }

    /// Delete a task whatever its state.
    pub fn remove(&self, id: &str) -> Option<DownloadTask> {
        let removed = {
            let mut tasks = lock(&self.tasks);
            let index = tasks.iter().position(|t| t.id == id)?;
            let removed = tasks.remove(index);
            self.stage(&tasks);
            removed
        };
        info!("Removed task {} ({})", id, removed.status);
        self.flush();
        Some(removed)
    }

    /// Put a failed task back into `Pending`.
    pub fn retry(&self, id: &str) -> Result<()> {
        {
            let mut tasks = lock(&self.tasks);
            let task = tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| MediaQueueError::TaskNotFound(id.to_string()))?;
            if task.status != TaskStatus::Failed {
                return Err(MediaQueueError::InvalidState {
                    id: id.to_string(),
                    action: "retried",
                    status: task.status.to_string(),
                }
                .into());
            }
            if task.retry_count >= task.max_retries {
                return Err(MediaQueueError::RetryLimitReached {
                    id: id.to_string(),
                    max_retries: task.max_retries,
                }
                .into());
            }
            reset_for_retry(task);
            info!(
                "Retrying task {} ({}/{})",
                id, task.retry_count, task.max_retries
            );
            self.stage(&tasks);
        }
        self.flush();
        Ok(())
    }

    /// Retry every failed task that is still under its limit.
    pub fn retry_all_failed(&self) -> usize {
        let count = {
            let mut tasks = lock(&self.tasks);
            let mut count = 0;
            for task in tasks.iter_mut().filter(|t| t.can_retry()) {
                reset_for_retry(task);
                count += 1;
            }
            if count > 0 {
                self.stage(&tasks);
            }
            count
        };
        if count > 0 {
            info!("Retrying {} failed tasks", count);
            self.flush();
        }
        count
    }

    /// Pause a pending or downloading task.
    pub fn pause(&self, id: &str) -> Result<()> {
        self.transition(id, "paused", TaskStatus::Paused, |s| {
            matches!(s, TaskStatus::Pending | TaskStatus::Downloading)
        })
    }

    /// Return a paused task to `Pending`.
    pub fn resume(&self, id: &str) -> Result<()> {
        self.transition(id, "resumed", TaskStatus::Pending, |s| s == TaskStatus::Paused)
    }

    fn transition<F>(&self, id: &str, action: &'static str, to: TaskStatus, allowed: F) -> Result<()>
    where
        F: FnOnce(TaskStatus) -> bool,
    {
        {
            let mut tasks = lock(&self.tasks);
            let task = tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| MediaQueueError::TaskNotFound(id.to_string()))?;
            if !allowed(task.status) {
                return Err(MediaQueueError::InvalidState {
                    id: id.to_string(),
                    action,
                    status: task.status.to_string(),
                }
                .into());
            }
            task.status = to;
            task.error = None;
            info!("Task {} {}", id, action);
            self.stage(&tasks);
        }
        self.flush();
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<DownloadTask> {
        lock(&self.tasks).iter().find(|t| t.id == id).cloned()
    }

    /// All tasks, newest first.
    pub fn list_all(&self) -> Vec<DownloadTask> {
        sorted_snapshot(&lock(&self.tasks))
    }

    /// Pending tasks, newest first.
    pub fn list_pending(&self) -> Vec<DownloadTask> {
        self.list_by_status(TaskStatus::Pending)
    }

    pub fn list_by_status(&self, status: TaskStatus) -> Vec<DownloadTask> {
        self.list_all()
            .into_iter()
            .filter(|t| t.status == status)
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.tasks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear_completed(&self) -> usize {
        self.clear_status(TaskStatus::Completed)
    }

    pub fn clear_failed(&self) -> usize {
        self.clear_status(TaskStatus::Failed)
    }

    fn clear_status(&self, status: TaskStatus) -> usize {
        let removed = {
            let mut tasks = lock(&self.tasks);
            let before = tasks.len();
            tasks.retain(|t| t.status != status);
            let removed = before - tasks.len();
            if removed > 0 {
                self.stage(&tasks);
            }
            removed
        };
        if removed > 0 {
            info!("Cleared {} {} tasks from queue", removed, status);
            self.flush();
        }
        removed
    }

    /// Register `listener` for a snapshot after every mutation.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&[DownloadTask]) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, Arc::new(listener)));
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Hook fired shortly after each enqueue.
    pub fn set_auto_start<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *lock(&self.auto_start) = Some(Arc::new(hook));
    }

    pub fn clear_auto_start(&self) {
        *lock(&self.auto_start) = None;
    }

    // Runs with the task lock held, so snapshots queue in mutation order.
    fn stage(&self, tasks: &[DownloadTask]) {
        lock(&self.outbox).pending.push_back(sorted_snapshot(tasks));
    }

    /// Deliver staged snapshots oldest first.
    ///
    /// One caller delivers at a time. A concurrent or nested call leaves its
    /// snapshot to the active one, which drains the outbox before returning.
    fn flush(&self) {
        {
            let mut outbox = lock(&self.outbox);
            if outbox.delivering {
                return;
            }
            outbox.delivering = true;
        }
        let mut guard = FlushGuard {
            outbox: &self.outbox,
            armed: true,
        };

        loop {
            let next = {
                let mut outbox = lock(&self.outbox);
                match outbox.pending.pop_front() {
                    Some(snapshot) => snapshot,
                    None => {
                        outbox.delivering = false;
                        guard.armed = false;
                        return;
                    }
                }
            };
            self.notify(&next);
        }
    }

    fn notify(&self, snapshot: &[DownloadTask]) {
        let listeners: Vec<Listener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
    }

    fn schedule_auto_start(&self) {
        let Some(hook) = lock(&self.auto_start).clone() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(AUTO_START_DELAY).await;
                    hook();
                });
            }
            Err(_) => debug!("No async runtime, skipping auto-start"),
        }
    }
}

fn is_downloading(task: &DownloadTask) -> bool {
    task.status == TaskStatus::Downloading
}

fn reset_for_retry(task: &mut DownloadTask) {
    task.status = TaskStatus::Pending;
    task.progress = 0.0;
    task.error = None;
    task.completed_at = None;
    task.retry_count += 1;
}

fn apply_update(task: &mut DownloadTask, update: TaskUpdate) {
    let was_downloading = task.status == TaskStatus::Downloading;

    if let Some(title) = update.title {
        task.title = title;
    }
    if let Some(status) = update.status {
        task.status = status;
    }
    if let Some(progress) = update.progress {
        let progress = if progress.is_nan() { 0.0 } else { progress.clamp(0.0, 100.0) };
        task.progress = if was_downloading && task.status == TaskStatus::Downloading {
            task.progress.max(progress)
        } else {
            progress
        };
    }
    if task.completed_at.is_none() {
        task.completed_at = update.completed_at;
    }
    if let Some(error) = update.error {
        task.error = Some(error);
    }

    if task.status != TaskStatus::Failed {
        task.error = None;
    }
    if task.status == TaskStatus::Completed {
        task.progress = 100.0;
        task.completed_at.get_or_insert_with(Utc::now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn queue_with(urls: &[&str]) -> (TaskQueue, Vec<String>) {
        let queue = TaskQueue::new();
        let ids = urls
            .iter()
            .map(|url| queue.enqueue(NewTask::new(*url, "/downloads")).unwrap())
            .collect();
        (queue, ids)
    }

    fn error_of(result: Result<()>) -> MediaQueueError {
        let err = result.unwrap_err();
        match err.downcast::<MediaQueueError>() {
            Ok(err) => err,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_enqueue_creates_pending_task() {
        let (queue, ids) = queue_with(&["https://example.com/a"]);
        let task = queue.get(&ids[0]).unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0.0);
        assert_eq!(task.title, "https://example.com/a");
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.max_retries, DEFAULT_MAX_RETRIES);
        assert!(task.error.is_none());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_enqueue_rejects_empty_inputs() {
        let queue = TaskQueue::new();
        assert!(queue.enqueue(NewTask::new("  ", "/downloads")).is_err());
        assert!(queue.enqueue(NewTask::new("https://example.com", "")).is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_list_all_is_newest_first_with_stable_ties() {
        let (queue, ids) = queue_with(&["a", "b", "c"]);
        let listed = queue.list_all();

        for pair in listed.windows(2) {
            assert!(pair[0].added_at >= pair[1].added_at);
        }
        // Equal timestamps keep insertion order.
        for pair in listed.windows(2) {
            if pair[0].added_at == pair[1].added_at {
                let a = ids.iter().position(|id| *id == pair[0].id).unwrap();
                let b = ids.iter().position(|id| *id == pair[1].id).unwrap();
                assert!(a < b);
            }
        }
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let queue = TaskQueue::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _sub = queue.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!queue.update("missing", TaskUpdate::progress(10.0)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_only_one_task_downloading() {
        let (queue, ids) = queue_with(&["a", "b"]);
        assert!(queue.mark_downloading(&ids[0]));
        assert!(!queue.mark_downloading(&ids[1]));
        assert!(!queue.update(&ids[1], TaskUpdate::status(TaskStatus::Downloading)));
        assert_eq!(queue.get(&ids[1]).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let (queue, ids) = queue_with(&["a"]);
        let id = &ids[0];
        queue.mark_downloading(id);

        queue.set_progress(id, 40.0);
        queue.set_progress(id, 20.0);
        assert_eq!(queue.get(id).unwrap().progress, 40.0);

        queue.set_progress(id, 250.0);
        assert_eq!(queue.get(id).unwrap().progress, 100.0);
    }

    #[test]
    fn test_helpers_ignore_tasks_not_downloading() {
        let (queue, ids) = queue_with(&["a"]);
        let id = &ids[0];

        assert!(!queue.set_progress(id, 50.0));
        assert!(!queue.mark_completed(id));
        assert!(!queue.mark_failed(id, "boom"));
        assert_eq!(queue.get(id).unwrap().status, TaskStatus::Pending);
    }

    #[test]
    fn test_completion_sets_timestamp_once() {
        let (queue, ids) = queue_with(&["a"]);
        let id = &ids[0];
        queue.mark_downloading(id);
        queue.set_progress(id, 30.0);
        assert!(queue.mark_completed(id));

        let done = queue.get(id).unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert_eq!(done.progress, 100.0);
        let completed_at = done.completed_at.unwrap();

        let later = completed_at + chrono::Duration::seconds(60);
        queue.update(
            id,
            TaskUpdate {
                completed_at: Some(later),
                ..Default::default()
            },
        );
        assert_eq!(queue.get(id).unwrap().completed_at, Some(completed_at));
    }

    #[test]
    fn test_error_only_kept_while_failed() {
        let (queue, ids) = queue_with(&["a"]);
        let id = &ids[0];
        queue.update(
            id,
            TaskUpdate {
                error: Some("stray".to_string()),
                ..Default::default()
            },
        );
        assert!(queue.get(id).unwrap().error.is_none());

        queue.mark_downloading(id);
        queue.mark_failed(id, "Download failed with code: 1");
        let failed = queue.get(id).unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("Download failed with code: 1"));
    }

    #[test]
    fn test_retry_resets_task() {
        let (queue, ids) = queue_with(&["a"]);
        let id = &ids[0];
        queue.mark_downloading(id);
        queue.set_progress(id, 70.0);
        queue.mark_failed(id, "boom");

        queue.retry(id).unwrap();
        let task = queue.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0.0);
        assert_eq!(task.retry_count, 1);
        assert!(task.error.is_none());
    }

    #[test]
    fn test_retry_limit_leaves_state_unchanged() {
        let queue = TaskQueue::new();
        let id = queue
            .enqueue(NewTask::new("a", "/downloads").max_retries(1))
            .unwrap();
        queue.mark_downloading(&id);
        queue.mark_failed(&id, "first");
        queue.retry(&id).unwrap();
        queue.mark_downloading(&id);
        queue.mark_failed(&id, "second");

        let before = queue.get(&id).unwrap();
        assert!(matches!(
            error_of(queue.retry(&id)),
            MediaQueueError::RetryLimitReached { max_retries: 1, .. }
        ));
        assert_eq!(queue.get(&id).unwrap(), before);
    }

    #[test]
    fn test_retry_requires_failed_state() {
        let (queue, ids) = queue_with(&["a"]);
        assert!(matches!(
            error_of(queue.retry(&ids[0])),
            MediaQueueError::InvalidState { action: "retried", .. }
        ));
        assert!(matches!(
            error_of(queue.retry("missing")),
            MediaQueueError::TaskNotFound(_)
        ));
    }

    #[test]
    fn test_retry_all_failed_skips_exhausted() {
        let queue = TaskQueue::new();
        let retryable = queue.enqueue(NewTask::new("a", "/d")).unwrap();
        let exhausted = queue.enqueue(NewTask::new("b", "/d").max_retries(0)).unwrap();
        for id in [&retryable, &exhausted] {
            queue.mark_downloading(id);
            queue.mark_failed(id, "boom");
        }

        assert_eq!(queue.retry_all_failed(), 1);
        assert_eq!(queue.get(&retryable).unwrap().status, TaskStatus::Pending);
        assert_eq!(queue.get(&exhausted).unwrap().status, TaskStatus::Failed);
    }

    #[test]
    fn test_pause_and_resume() {
        let (queue, ids) = queue_with(&["a"]);
        let id = &ids[0];

        queue.pause(id).unwrap();
        assert_eq!(queue.get(id).unwrap().status, TaskStatus::Paused);
        assert!(queue.list_pending().is_empty());
        assert!(queue.pause(id).is_err());

        queue.resume(id).unwrap();
        assert_eq!(queue.get(id).unwrap().status, TaskStatus::Pending);
        assert!(queue.resume(id).is_err());
    }

    #[test]
    fn test_remove_even_while_downloading() {
        let (queue, ids) = queue_with(&["a", "b"]);
        queue.mark_downloading(&ids[0]);

        let removed = queue.remove(&ids[0]).unwrap();
        assert_eq!(removed.status, TaskStatus::Downloading);
        assert!(queue.get(&ids[0]).is_none());
        assert!(queue.remove(&ids[0]).is_none());
        // The slot is free again.
        assert!(queue.mark_downloading(&ids[1]));
    }

    #[test]
    fn test_clear_completed_and_failed() {
        let (queue, ids) = queue_with(&["a", "b", "c"]);
        queue.mark_downloading(&ids[0]);
        queue.mark_completed(&ids[0]);
        queue.mark_downloading(&ids[1]);
        queue.mark_failed(&ids[1], "boom");

        assert_eq!(queue.clear_completed(), 1);
        assert_eq!(queue.clear_failed(), 1);
        assert_eq!(queue.clear_failed(), 0);
        assert_eq!(queue.list_all().len(), 1);
        assert_eq!(queue.list_all()[0].id, ids[2]);
    }

    #[test]
    fn test_subscribers_get_snapshots_and_can_unsubscribe() {
        let queue = TaskQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = queue.subscribe(move |tasks| {
            sink.lock().unwrap().push(tasks.len());
        });

        let id = queue.enqueue(NewTask::new("a", "/d")).unwrap();
        queue.enqueue(NewTask::new("b", "/d")).unwrap();
        queue.remove(&id);
        sub.unsubscribe();
        queue.enqueue(NewTask::new("c", "/d")).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 1]);
    }

    #[test]
    fn test_subscriber_may_call_back_into_queue() {
        let queue = Arc::new(TaskQueue::new());
        let observed = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&queue);
        let counter = Arc::clone(&observed);
        let _sub = queue.subscribe(move |_| {
            counter.store(inner.list_all().len(), Ordering::SeqCst);
        });

        queue.enqueue(NewTask::new("a", "/d")).unwrap();
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_nested_mutation_is_delivered_after_outer_snapshot() {
        let queue = Arc::new(TaskQueue::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner = Arc::clone(&queue);
        let sink = Arc::clone(&seen);
        let _sub = queue.subscribe(move |tasks| {
            let status = tasks[0].status;
            sink.lock().unwrap().push(status);
            if status == TaskStatus::Pending {
                inner.pause(&tasks[0].id).unwrap();
            }
        });

        queue.enqueue(NewTask::new("a", "/d")).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![TaskStatus::Pending, TaskStatus::Paused]
        );
    }

    #[test]
    fn test_concurrent_snapshots_arrive_in_mutation_order() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 50;

        let queue = Arc::new(TaskQueue::new());
        let lengths = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lengths);
        let _sub = queue.subscribe(move |tasks| {
            sink.lock().unwrap().push(tasks.len());
        });

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        queue
                            .enqueue(NewTask::new(format!("https://example.com/{t}/{i}"), "/d"))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Every enqueue grows the queue by one, so any reordering shows up here.
        let expected: Vec<usize> = (1..=THREADS * PER_THREAD).collect();
        assert_eq!(*lengths.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_auto_start_fires_after_enqueue() {
        let queue = TaskQueue::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        queue.set_auto_start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        queue.enqueue(NewTask::new("a", "/d")).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(AUTO_START_DELAY * 3).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        queue.clear_auto_start();
        queue.enqueue(NewTask::new("b", "/d")).unwrap();
        tokio::time::sleep(AUTO_START_DELAY * 3).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_auto_start_without_runtime_is_skipped() {
        let queue = TaskQueue::new();
        queue.set_auto_start(|| panic!("must not fire"));
        queue.enqueue(NewTask::new("a", "/d")).unwrap();
    }
}
