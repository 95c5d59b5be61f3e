//! Named cookie profiles and the cookie file cache

use super::{Credential, CredentialSource};
use crate::utils::error::MediaQueueError;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A named cookie file for one site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieProfile {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub cookie_file: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ProfileState {
    profiles: Vec<CookieProfile>,
    active: Option<String>,
    enabled: bool,
    fallback_cookie_file: Option<PathBuf>,
    browser: Option<String>,
}

/// In-memory profile registry with one active profile.
///
/// Every task in the queue uses the active profile; there is no per-domain
/// matching.
#[derive(Debug, Default)]
pub struct ProfileStore {
    state: Mutex<ProfileState>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `--cookies-from-browser <browser>` when no cookie file is usable.
    pub fn with_browser_fallback(self, browser: impl Into<String>) -> Self {
        self.lock().browser = Some(browser.into());
        self
    }

    /// Cookie file used when cookies are enabled but no profile is active.
    pub fn set_fallback_cookie_file(&self, path: Option<PathBuf>) {
        self.lock().fallback_cookie_file = path;
    }

    pub fn add_profile(
        &self,
        name: impl Into<String>,
        domain: impl Into<String>,
        cookie_file: impl Into<PathBuf>,
    ) -> CookieProfile {
        let profile = CookieProfile {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            domain: domain.into(),
            cookie_file: cookie_file.into(),
            created_at: Utc::now(),
        };
        info!("Added cookie profile {} ({})", profile.name, profile.domain);
        self.lock().profiles.push(profile.clone());
        profile
    }

    /// Remove a profile; removing the active one disables cookies.
    pub fn remove_profile(&self, id: &str) -> Option<CookieProfile> {
        let mut state = self.lock();
        let index = state.profiles.iter().position(|p| p.id == id)?;
        let removed = state.profiles.remove(index);
        if state.active.as_deref() == Some(id) {
            state.active = None;
            state.enabled = false;
        }
        Some(removed)
    }

    /// Make a profile active and enable cookies.
    pub fn activate(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        if !state.profiles.iter().any(|p| p.id == id) {
            return Err(MediaQueueError::InvalidInput(format!("unknown cookie profile {id}")).into());
        }
        state.active = Some(id.to_string());
        state.enabled = true;
        Ok(())
    }

    pub fn deactivate(&self) {
        let mut state = self.lock();
        state.active = None;
        state.enabled = false;
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.lock().enabled = enabled;
    }

    pub fn active_profile(&self) -> Option<CookieProfile> {
        let state = self.lock();
        let active = state.active.as_deref()?;
        state.profiles.iter().find(|p| p.id == active).cloned()
    }

    pub fn profiles(&self) -> Vec<CookieProfile> {
        self.lock().profiles.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProfileState> {
        // Profile state stays consistent even if a holder panicked.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialSource for ProfileStore {
    fn resolve(&self, url: &str) -> Credential {
        let state = self.lock();

        let cookie_file = if state.enabled {
            let active = state.active.as_deref();
            state
                .profiles
                .iter()
                .find(|p| Some(p.id.as_str()) == active)
                .map(|p| p.cookie_file.clone())
                .or_else(|| state.fallback_cookie_file.clone())
        } else {
            None
        };

        if let Some(path) = &cookie_file {
            if !path.is_file() {
                warn!("Cookie file {} is missing, ignoring it for {}", path.display(), url);
            }
        }

        let credential = Credential {
            cookie_file: cookie_file.filter(|path| path.is_file()),
            browser: state.browser.clone(),
        };
        debug!(?credential, "Resolved credential for {}", url);
        credential
    }
}

/// File-name-safe form of a domain: `[^a-zA-Z0-9.-]` become `-`, lowercased.
pub fn sanitize_domain(domain: &str) -> String {
    domain
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Copy a Netscape cookie file into the cache as `<domain>.txt`.
pub fn import_cookie_file(source: &Path, domain: &str, cache_dir: &Path) -> Result<PathBuf> {
    if !source.is_file() {
        return Err(MediaQueueError::CookieImport(format!(
            "source file does not exist: {}",
            source.display()
        ))
        .into());
    }

    let is_txt = source
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("txt"))
        .unwrap_or(false);
    if !is_txt {
        return Err(MediaQueueError::CookieImport(
            "only .txt cookie files are supported".to_string(),
        )
        .into());
    }

    std::fs::create_dir_all(cache_dir).map_err(MediaQueueError::from)?;
    let target = cache_dir.join(format!("{}.txt", sanitize_domain(domain)));
    std::fs::copy(source, &target).map_err(MediaQueueError::from)?;

    info!("Cookie file copied: {} -> {}", source.display(), target.display());
    Ok(target)
}

/// Delete cached `.txt` cookie files, returning how many were removed.
pub fn clear_cookie_cache(cache_dir: &Path) -> Result<usize> {
    if !cache_dir.exists() {
        return Ok(0);
    }

    let mut deleted = 0;
    for entry in std::fs::read_dir(cache_dir).map_err(MediaQueueError::from)? {
        let path = entry.map_err(MediaQueueError::from)?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("txt") {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => deleted += 1,
            Err(e) => warn!("Failed to delete cookie file {}: {}", path.display(), e),
        }
    }

    info!("Cleared {} cached cookie files", deleted);
    Ok(deleted)
}
