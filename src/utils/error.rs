//! Error handling for mediaqueue

use crate::downloader::diagnostics::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for mediaqueue
#[derive(Debug, Error)]
pub enum MediaQueueError {
    #[error("{tool} binary not found at: {}", path.display())]
    PreconditionMissing { tool: &'static str, path: PathBuf },

    #[error("Failed to start {tool}: {source}")]
    SpawnFailure {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {secs} seconds")]
    Timeout { tool: &'static str, secs: u64 },

    /// `kind` is set when the diagnostic output was classified
    #[error("{message}")]
    ToolExitNonZero {
        code: Option<i32>,
        kind: Option<ErrorKind>,
        message: String,
    },

    #[error("Failed to parse video info: {0}")]
    ParseFailure(#[source] serde_json::Error),

    #[error("Download cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Task {id} cannot be {action} while {status}")]
    InvalidState {
        id: String,
        action: &'static str,
        status: String,
    },

    #[error("Task {id} reached its retry limit ({max_retries})")]
    RetryLimitReached { id: String, max_retries: u32 },

    #[error("Cookie import failed: {0}")]
    CookieImport(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl MediaQueueError {
    /// Render an exit status the way the tool failure messages expect.
    pub fn exit_code_label(code: Option<i32>) -> String {
        match code {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        }
    }
}
