//! yt-dlp argument construction
//!
//! Probe and download invocations share the network and credential flags;
//! only the mode flags differ.

use crate::credentials::Credential;
use crate::downloader::traits::DownloadRequest;
use crate::utils::config::{AppSettings, NetworkSettings};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Output file name pattern, relative to the task's directory
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Ordered argument list for one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolArgs(Vec<OsString>);

impl ToolArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(&mut self, flag: &str) -> &mut Self {
        self.0.push(flag.into());
        self
    }

    pub fn opt(&mut self, flag: &str, value: impl AsRef<OsStr>) -> &mut Self {
        self.0.push(flag.into());
        self.0.push(value.as_ref().to_os_string());
        self
    }

    pub fn extend<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.0.extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn as_slice(&self) -> &[OsString] {
        &self.0
    }

    /// Lossy string form, for logs and assertions
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    /// Value following `flag`, if present
    pub fn value_of(&self, flag: &str) -> Option<String> {
        let index = self.0.iter().position(|a| a == flag)?;
        self.0
            .get(index + 1)
            .map(|v| v.to_string_lossy().into_owned())
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.0.iter().any(|a| a == flag)
    }
}

impl IntoIterator for ToolArgs {
    type Item = OsString;
    type IntoIter = std::vec::IntoIter<OsString>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

fn push_network(args: &mut ToolArgs, network: &NetworkSettings) {
    args.opt("--socket-timeout", network.socket_timeout.to_string())
        .opt("--retries", network.retries.to_string())
        .opt("--fragment-retries", network.retries.to_string())
        .opt("--retry-sleep", network.retry_delay.to_string());
}

fn push_credential(args: &mut ToolArgs, credential: &Credential) {
    if let Some(cookie_file) = credential.usable_cookie_file() {
        args.opt("--cookies", cookie_file);
    } else if let Some(browser) = &credential.browser {
        args.opt("--cookies-from-browser", browser);
    }
}

/// Arguments for a metadata-only probe.
pub fn probe_args(url: &str, settings: &AppSettings, credential: &Credential) -> ToolArgs {
    let mut args = ToolArgs::new();
    args.flag("--dump-json").flag("--no-playlist");
    push_network(&mut args, &settings.network);
    args.flag("--ignore-errors")
        .flag("--no-warnings")
        .opt("--user-agent", &settings.network.user_agent);
    if let Some(proxy) = settings.network.proxy() {
        args.opt("--proxy", proxy);
    }
    push_credential(&mut args, credential);
    args.extend(&settings.ytdlp.additional_args);
    args.flag(url);
    args
}

/// `<dir>/%(title)s.%(ext)s`
pub fn output_template(output_dir: &Path) -> PathBuf {
    output_dir.join(OUTPUT_TEMPLATE)
}

/// Arguments for a download with newline-flushed progress.
pub fn download_args(request: &DownloadRequest, settings: &AppSettings, ffmpeg_dir: &Path) -> ToolArgs {
    let mut args = ToolArgs::new();
    args.opt("--ffmpeg-location", ffmpeg_dir)
        .opt("--output", output_template(&request.output_dir))
        .flag("--no-playlist");
    push_network(&mut args, &settings.network);
    args.opt("--user-agent", &settings.network.user_agent);
    if let Some(proxy) = settings.network.proxy() {
        args.opt("--proxy", proxy);
    }
    if let Some(rate) = settings.ytdlp.rate_limit.as_deref().filter(|r| !r.trim().is_empty()) {
        args.opt("--limit-rate", rate.trim());
    }
    push_credential(&mut args, &request.credential);
    args.extend(&settings.ytdlp.additional_args);

    if request.audio_only {
        args.flag("--extract-audio").opt("--audio-format", "mp3");
    } else if let Some(format) = request.format.as_deref().filter(|f| !f.is_empty()) {
        args.opt("--format", format);
    }

    args.flag("--newline").flag(&request.url);
    args
}
