//! Utility modules for error handling and configuration

pub mod bundle_paths;
pub mod config;
pub mod error;

// Re-export for convenience
pub use bundle_paths::{get_downloads_dir, BinaryPaths, BinaryStatus};
pub use config::{AppSettings, ConfigFile, SettingsSource};
pub use error::MediaQueueError;
