//! External binary and data path resolution
//!
//! yt-dlp and ffmpeg are looked up in a bundled directory laid out as
//! `<binaries dir>/<platform>/<name>[.exe]`, next to the executable by default.
//! When a bundled copy is missing, the system `PATH` is consulted.

use crate::utils::error::MediaQueueError;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const YTDLP: &str = "yt-dlp";
pub const FFMPEG: &str = "ffmpeg";

/// Resolved locations of the external tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryPaths {
    pub ytdlp: PathBuf,
    pub ffmpeg: PathBuf,
}

/// Presence of each tool at its resolved location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryStatus {
    pub ytdlp: bool,
    pub ffmpeg: bool,
    pub paths: BinaryPaths,
}

impl BinaryPaths {
    /// Explicit paths, no lookup.
    pub fn new(ytdlp: impl Into<PathBuf>, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ytdlp: ytdlp.into(),
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Resolve both tools, preferring the bundled directory.
    ///
    /// `binaries_dir` defaults to `binaries/` next to the current executable.
    /// If neither the bundled copy nor a `PATH` entry exists, the bundled
    /// location is returned so the precondition error names it.
    pub fn resolve(binaries_dir: Option<&Path>) -> Self {
        let base = binaries_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(default_binaries_dir);

        Self {
            ytdlp: resolve_binary(&base, YTDLP),
            ffmpeg: resolve_binary(&base, FFMPEG),
        }
    }

    /// Check which tools are actually present.
    pub fn check(&self) -> BinaryStatus {
        BinaryStatus {
            ytdlp: self.ytdlp.is_file(),
            ffmpeg: self.ffmpeg.is_file(),
            paths: self.clone(),
        }
    }

    /// Directory passed to `--ffmpeg-location`
    pub fn ffmpeg_dir(&self) -> PathBuf {
        self.ffmpeg
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Platform directory name used in the bundled layout.
pub fn platform_dir_name() -> &'static str {
    match std::env::consts::OS {
        "windows" => "win32",
        "macos" => "darwin",
        other => other,
    }
}

/// File name of a tool on this platform
pub fn binary_file_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Location of a tool inside a bundled binaries directory.
pub fn bundled_binary_path(binaries_dir: &Path, name: &str) -> PathBuf {
    binaries_dir
        .join(platform_dir_name())
        .join(binary_file_name(name))
}

fn default_binaries_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("binaries")))
        .unwrap_or_else(|| PathBuf::from("binaries"))
}

fn resolve_binary(base: &Path, name: &str) -> PathBuf {
    let bundled = bundled_binary_path(base, name);
    if bundled.is_file() {
        if is_executable(&bundled) {
            info!("Using bundled {}: {}", name, bundled.display());
            return bundled;
        }
        warn!("Bundled {} exists but is not executable: {}", name, bundled.display());
    }

    if let Ok(system) = which::which(name) {
        info!("Using system {}: {}", name, system.display());
        return system;
    }

    debug!("{} not found, keeping bundled location {}", name, bundled.display());
    bundled
}

/// Check if a file is executable
pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        std::fs::metadata(path)
            .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Fail with `PreconditionMissing` unless `path` is an existing file.
pub fn ensure_tool(path: &Path, tool: &'static str) -> Result<(), MediaQueueError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(MediaQueueError::PreconditionMissing {
            tool,
            path: path.to_path_buf(),
        })
    }
}

/// Directory where imported cookie files are cached: `<tmp>/yt-dlp-cookie`
pub fn cookie_cache_dir() -> PathBuf {
    std::env::temp_dir().join("yt-dlp-cookie")
}

/// Get the downloads directory, never a relative path.
pub fn get_downloads_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| {
            warn!("Could not determine Downloads directory, using temp dir");
            std::env::temp_dir()
        })
}
