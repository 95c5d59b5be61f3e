//! Cookie credentials for yt-dlp invocations

pub mod profiles;

pub use profiles::{clear_cookie_cache, import_cookie_file, CookieProfile, ProfileStore};

use std::path::PathBuf;

/// Credential material resolved for one invocation.
///
/// A cookie file wins when it exists on disk; otherwise the browser mode is
/// used if set. A cookie file that has disappeared is treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub cookie_file: Option<PathBuf>,
    pub browser: Option<String>,
}

impl Credential {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn cookie_file(path: impl Into<PathBuf>) -> Self {
        Self {
            cookie_file: Some(path.into()),
            browser: None,
        }
    }

    pub fn browser(name: impl Into<String>) -> Self {
        Self {
            cookie_file: None,
            browser: Some(name.into()),
        }
    }

    /// The cookie file, only if it is present on disk.
    pub fn usable_cookie_file(&self) -> Option<&PathBuf> {
        self.cookie_file.as_ref().filter(|path| path.is_file())
    }
}

/// Supplies the credential for a target URL.
pub trait CredentialSource: Send + Sync {
    fn resolve(&self, url: &str) -> Credential;
}

/// No credentials at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialSource for NoCredentials {
    fn resolve(&self, _url: &str) -> Credential {
        Credential::none()
    }
}

impl CredentialSource for Credential {
    fn resolve(&self, _url: &str) -> Credential {
        self.clone()
    }
}
