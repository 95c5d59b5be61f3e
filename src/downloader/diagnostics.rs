//! Classification of yt-dlp diagnostics
//!
//! The tool reports failures as free text on stderr. Everything that depends on
//! its exact phrasing lives in the two tables below.

use serde::{Deserialize, Serialize};
use std::fmt;

/// User-facing error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    NetworkUnstable,
    PageUnreachable,
    ContentUnavailable,
    AgeRestricted,
    PrivateContent,
    RegionBlocked,
    Unknown,
}

/// Ordered marker table; the first entry with a matching marker wins.
const ERROR_MARKERS: &[(&[&str], ErrorKind)] = &[
    (
        &["ConnectionResetError", "Connection aborted"],
        ErrorKind::NetworkUnstable,
    ),
    (&["Unable to download webpage"], ErrorKind::PageUnreachable),
    (&["Video unavailable"], ErrorKind::ContentUnavailable),
    (&["Sign in to confirm your age"], ErrorKind::AgeRestricted),
    (&["Private video"], ErrorKind::PrivateContent),
    (&["This video is not available"], ErrorKind::RegionBlocked),
];

/// Known non-fatal notices that yt-dlp prints as warnings
const BENIGN_WARNING_MARKERS: &[&str] = &["SABR", "Some tv client", "have been skipped"];

impl ErrorKind {
    fn user_message(self) -> &'static str {
        match self {
            ErrorKind::NetworkUnstable => {
                "The network connection is unstable. Check your connection or try again later; a proxy may be required if the problem persists."
            }
            ErrorKind::PageUnreachable => {
                "Unable to reach the video page. Check that the link is correct and the network is working."
            }
            ErrorKind::ContentUnavailable => {
                "The video is unavailable. It may have been removed or made private."
            }
            ErrorKind::AgeRestricted => {
                "This video requires age verification. Use a cookie profile that is signed in."
            }
            ErrorKind::PrivateContent => "This is a private video and cannot be accessed.",
            ErrorKind::RegionBlocked => "This video is not available in your region.",
            ErrorKind::Unknown => "Failed to fetch video info",
        }
    }
}

/// Result of classifying a diagnostic dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    /// First line of the raw text, verbatim
    pub first_line: String,
}

impl ClassifiedError {
    /// Human readable message, never empty.
    pub fn message(&self) -> String {
        match self.kind {
            ErrorKind::Unknown if self.first_line.is_empty() => {
                format!("{}: unknown error", self.kind.user_message())
            }
            ErrorKind::Unknown => format!("{}: {}", self.kind.user_message(), self.first_line),
            kind => kind.user_message().to_string(),
        }
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Map captured stderr to an [`ErrorKind`].
pub fn classify(stderr: &str) -> ClassifiedError {
    let first_line = stderr
        .split('\n')
        .next()
        .unwrap_or_default()
        .trim_end_matches('\r')
        .to_string();

    let kind = ERROR_MARKERS
        .iter()
        .find(|(markers, _)| markers.iter().any(|marker| stderr.contains(marker)))
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::Unknown);

    ClassifiedError { kind, first_line }
}

/// How a live stderr line should be treated while a download runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StderrLine {
    /// Known harmless warning, logged only
    Benign,
    /// Explicit `ERROR` line, forwarded as an error event
    Error(String),
    /// Anything else
    Diagnostic,
}

pub fn classify_stderr_line(line: &str) -> StderrLine {
    if line.contains("WARNING")
        && BENIGN_WARNING_MARKERS
            .iter()
            .any(|marker| line.contains(marker))
    {
        return StderrLine::Benign;
    }

    if line.contains("ERROR") {
        return StderrLine::Error(line.trim().to_string());
    }

    StderrLine::Diagnostic
}
