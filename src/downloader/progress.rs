//! Progress parsing for yt-dlp `--newline` output
//!
//! yt-dlp prints one progress line per update, e.g.
//! `[download]  42.5% of ~ 150.00MiB at  5.20MiB/s ETA 00:15`.
//! [`parse_progress_line`] extracts the numbers from a single line and
//! [`ProgressParser`] turns a stream of output chunks into de-duplicated
//! [`ProgressEvent`]s for one invocation.

use serde::{Deserialize, Serialize};

/// Phase reported alongside a progress value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    #[default]
    Downloading,
    Completed,
}

/// Structured progress update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub percent: f64,
    pub size: Option<String>,
    pub speed: Option<String>,
    pub status: ProgressStatus,
}

impl ProgressEvent {
    pub fn downloading(percent: f64) -> Self {
        Self {
            percent,
            size: None,
            speed: None,
            status: ProgressStatus::Downloading,
        }
    }

    /// Synthetic event emitted for completion markers.
    pub fn completed() -> Self {
        Self {
            percent: 100.0,
            size: None,
            speed: None,
            status: ProgressStatus::Completed,
        }
    }
}

/// Numbers recognized on a single progress line
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressLine {
    pub percent: f64,
    /// Total size as printed, unit included (`45.6MiB`)
    pub size: String,
    /// Transfer rate as printed, unit included (`2.1MiB/s`)
    pub speed: String,
}

const COMPLETION_MARKERS: &[&str] = &[
    "[download] 100%",
    "100% complete",
    "has already been downloaded",
];

/// Parse `<pct>% of [~]<size> at <speed>/s` out of a line.
///
/// Lines whose size or speed is not numeric (`Unknown B/s`, fragment counters)
/// are not progress lines and yield `None`.
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    // 1. Percentage: the number immediately before the first '%'
    let pct_pos = line.find('%')?;
    let before = &line[..pct_pos];
    let num_start = before
        .rfind(|c: char| !(c.is_ascii_digit() || c == '.'))
        .map(|i| i + 1)
        .unwrap_or(0);
    let num_str = &before[num_start..];
    if num_str.is_empty() || !num_str.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let percent = num_str.parse::<f64>().ok()?;

    // 2. Total size: "of " followed by an optional '~'
    let rest = line[pct_pos + 1..].trim_start();
    let rest = rest.strip_prefix("of")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('~').unwrap_or(rest).trim_start();
    let (size, rest) = split_token(rest);
    if !is_quantity(size) {
        return None;
    }

    // 3. Speed: "at " followed by `<number><unit>/s`
    let rest = rest.trim_start().strip_prefix("at")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let (speed, _) = split_token(rest.trim_start());
    let rate = speed.strip_suffix("/s")?;
    if !is_quantity(rate) {
        return None;
    }

    Some(ProgressLine {
        percent,
        size: size.to_string(),
        speed: speed.to_string(),
    })
}

/// Whether a line reports that the file is complete.
pub fn is_completion_marker(line: &str) -> bool {
    COMPLETION_MARKERS.iter().any(|marker| line.contains(marker))
}

fn split_token(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(end) => (&s[..end], &s[end..]),
        None => (s, ""),
    }
}

/// `12.3MiB`, `900KiB`, `512B`: digits (with an optional fraction) then a unit.
fn is_quantity(token: &str) -> bool {
    let digits_end = token
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(token.len());
    let (number, unit) = token.split_at(digits_end);
    number.starts_with(|c: char| c.is_ascii_digit())
        && number.parse::<f64>().is_ok()
        && !unit.is_empty()
        && unit.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Per-invocation parser that suppresses repeated percentages.
#[derive(Debug, Default)]
pub struct ProgressParser {
    last_percent: Option<f64>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of stdout, which may hold several lines.
    pub fn feed(&mut self, chunk: &str) -> Vec<ProgressEvent> {
        let mut events = Vec::new();

        for line in chunk.split(['\n', '\r']) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(parsed) = parse_progress_line(line) {
                if self.last_percent != Some(parsed.percent) {
                    self.last_percent = Some(parsed.percent);
                    events.push(ProgressEvent {
                        percent: parsed.percent,
                        size: Some(parsed.size),
                        speed: Some(parsed.speed),
                        status: ProgressStatus::Downloading,
                    });
                }
            }

            if is_completion_marker(line) {
                self.last_percent = Some(100.0);
                events.push(ProgressEvent::completed());
            }
        }

        events
    }

    /// Last percentage emitted, if any
    pub fn last_percent(&self) -> Option<f64> {
        self.last_percent
    }
}
