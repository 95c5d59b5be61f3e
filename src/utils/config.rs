//! Application configuration
//!
//! Settings are read from a camelCase JSON file. Every field has a default, so
//! a partial file (or no file at all) is a valid configuration.

use crate::utils::bundle_paths::get_downloads_dir;
use crate::utils::error::MediaQueueError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    /// Default directory for new tasks
    pub download_location: PathBuf,

    /// Directory holding bundled `yt-dlp`/`ffmpeg` binaries
    pub binaries_dir: Option<PathBuf>,

    /// Network flags passed to every yt-dlp invocation
    pub network: NetworkSettings,

    /// yt-dlp specific knobs
    pub ytdlp: YtDlpSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            download_location: get_downloads_dir(),
            binaries_dir: None,
            network: NetworkSettings::default(),
            ytdlp: YtDlpSettings::default(),
        }
    }
}

/// Network settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkSettings {
    /// Proxy URL, empty for none
    pub proxy: String,
    pub user_agent: String,
    /// Socket timeout in seconds
    pub socket_timeout: u32,
    /// Retry count for requests and fragments
    pub retries: u32,
    /// Seconds to sleep between retries
    pub retry_delay: u32,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            proxy: String::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            socket_timeout: 30,
            retries: 5,
            retry_delay: 1,
        }
    }
}

impl NetworkSettings {
    pub fn proxy(&self) -> Option<&str> {
        let proxy = self.proxy.trim();
        (!proxy.is_empty()).then_some(proxy)
    }
}

/// yt-dlp settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct YtDlpSettings {
    /// Raw arguments appended to every invocation
    pub additional_args: Vec<String>,

    /// Value for `--limit-rate` (e.g. `2M`)
    pub rate_limit: Option<String>,

    /// Fall back to reading cookies from the browser when no cookie file is usable
    pub use_browser_cookies: bool,

    /// Browser name passed to `--cookies-from-browser`
    pub browser: String,
}

impl Default for YtDlpSettings {
    fn default() -> Self {
        Self {
            additional_args: Vec::new(),
            rate_limit: None,
            use_browser_cookies: false,
            browser: "chrome".to_string(),
        }
    }
}

impl AppSettings {
    /// Load settings from a JSON file, failing on IO or decode errors.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(MediaQueueError::from)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let settings = serde_json::from_str(&data)
            .map_err(MediaQueueError::from)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(settings)
    }

    /// Load settings, falling back to defaults when the file is missing or malformed.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Self::default();
        }

        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Config file could not be read, using defaults: {:#}", e);
                Self::default()
            }
        }
    }

    /// Write settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(MediaQueueError::from)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(MediaQueueError::from)?;
        std::fs::write(path, json).map_err(MediaQueueError::from)?;
        Ok(())
    }
}

/// Default location of the config file: `<config dir>/mediaqueue/config.json`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mediaqueue")
        .join("config.json")
}

/// Source of settings, resolved once per tool invocation.
pub trait SettingsSource: Send + Sync {
    fn current(&self) -> AppSettings;
}

impl SettingsSource for AppSettings {
    fn current(&self) -> AppSettings {
        self.clone()
    }
}

/// Settings re-read from disk on every invocation, so edits apply to the next task.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsSource for ConfigFile {
    fn current(&self) -> AppSettings {
        AppSettings::load_or_default(&self.path)
    }
}
