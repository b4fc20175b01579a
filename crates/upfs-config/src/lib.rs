//! # upfs-config
//!
//! Configuration management for upfs.
//!
//! Loads configuration from:
//! 1. `~/.upfs/config.toml` (global)
//! 2. `.upfs/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)

pub mod logging;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub refresh: RefreshConfig,
    pub mount: MountConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Load global config (~/.upfs/config.toml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                config = Self::from_file(&global_path)?;
            }
        }

        // 2. Load project config (.upfs/config.toml) - overrides global
        let project_path = Path::new(".upfs/config.toml");
        if project_path.exists() {
            debug!("Loading project config from {:?}", project_path);
            let project_config = Self::from_file(project_path)?;
            config.merge(project_config);
        }

        // 3. Apply environment variable overrides
        config.apply_env_overrides();

        Ok(config)
    }

    /// Parse a single config file without layering
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Global config path: ~/.upfs/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".upfs/config.toml"))
    }

    /// Merge another config (project overrides).
    ///
    /// Only fields that differ from the defaults replace ours.
    pub fn merge(&mut self, other: Config) {
        let defaults = Config::default();

        if other.store.dir != defaults.store.dir {
            self.store.dir = other.store.dir;
        }
        if other.store.sidecar_suffix != defaults.store.sidecar_suffix {
            self.store.sidecar_suffix = other.store.sidecar_suffix;
        }
        if other.store.bootstrap_marker != defaults.store.bootstrap_marker {
            self.store.bootstrap_marker = other.store.bootstrap_marker;
        }
        if other.store.url_format != defaults.store.url_format {
            self.store.url_format = other.store.url_format;
        }
        if other.refresh.staleness_secs != defaults.refresh.staleness_secs {
            self.refresh.staleness_secs = other.refresh.staleness_secs;
        }
        if other.refresh.interval_secs != defaults.refresh.interval_secs {
            self.refresh.interval_secs = other.refresh.interval_secs;
        }
        if other.refresh.change_detection != defaults.refresh.change_detection {
            self.refresh.change_detection = other.refresh.change_detection;
        }
        if other.mount.prefix != defaults.mount.prefix {
            self.mount.prefix = other.mount.prefix;
        }
        if other.mount.mountpoint.is_some() {
            self.mount.mountpoint = other.mount.mountpoint;
        }
        if other.mount.listing_page.is_some() {
            self.mount.listing_page = other.mount.listing_page;
        }
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup (environment in production)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("UPFS_STORE_DIR") {
            self.store.dir = PathBuf::from(dir);
        }
        if let Some(url_format) = lookup("UPFS_URL_FORMAT") {
            self.store.url_format = url_format;
        }
        if let Some(secs) = lookup("UPFS_STALENESS_SECS") {
            if let Ok(n) = secs.parse() {
                self.refresh.staleness_secs = n;
            }
        }
        if let Some(mountpoint) = lookup("UPFS_MOUNTPOINT") {
            self.mount.mountpoint = Some(PathBuf::from(mountpoint));
        }
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

/// Flat upload store layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding `<id>` and `<id><sidecar_suffix>` files
    pub dir: PathBuf,
    /// Suffix of the sidecar file carrying the display name
    pub sidecar_suffix: String,
    /// Reserved file name that is never indexed
    pub bootstrap_marker: String,
    /// Public download URL; `{id}` and `{name}` are substituted
    pub url_format: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/files"),
            sidecar_suffix: "-fname".to_string(),
            bootstrap_marker: "startid".to_string(),
            url_format: "https://example.invalid/{id}/{name}".to_string(),
        }
    }
}

/// How the refresh scheduler decides that a rebuilt index differs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeDetection {
    /// Publish only when the entry count changed
    #[default]
    Count,
    /// Publish whenever the set of IDs changed
    Content,
}

/// Refresh scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Minimum age of the last successful check before the store is rescanned
    pub staleness_secs: u64,
    /// Tick of the background refresh timer
    pub interval_secs: u64,
    pub change_detection: ChangeDetection,
}

impl RefreshConfig {
    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }

    pub fn interval(&self) -> Duration {
        // tokio::time::interval panics on a zero period
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            staleness_secs: 10,
            interval_secs: 10,
            change_detection: ChangeDetection::Count,
        }
    }
}

/// Virtual filesystem exposure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Path prefix stripped from protocol paths before lookup
    pub prefix: String,
    /// FUSE mount point (no mount when unset)
    pub mountpoint: Option<PathBuf>,
    /// File the rendered listing page is written to on every publish
    pub listing_page: Option<PathBuf>,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            prefix: "/webdav".to_string(),
            mountpoint: None,
            listing_page: None,
        }
    }
}
