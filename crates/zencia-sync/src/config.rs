//! # Dashboard Configuration
//!
//! Configuration for the sync core: where the backend lives, how hard to
//! retry, and where local state is kept.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ZENCIA_API_URL=https://api.example.com/api                         │
//! │     ZENCIA_LICENSE_API_URL=https://api.example.com/api                 │
//! │     ZENCIA_STORE_PATH=/var/lib/zencia/dashboard.db                     │
//! │     ZENCIA_REQUEST_TIMEOUT_SECS=8                                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/zencia-dashboard/dashboard.toml (Linux)                  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [api]
//! base_url = "http://localhost:8080/api"
//! license_base_url = "http://localhost:8080/api"
//! request_timeout_secs = 8
//!
//! [sync]
//! debounce_ms = 1000
//! max_attempts = 5
//! initial_backoff_ms = 1000
//! max_backoff_secs = 60
//! jitter = 0.5
//! watch_interval_secs = 15
//!
//! [store]
//! path = "/home/me/.local/share/zencia-dashboard/dashboard.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};
use crate::retry::RetryPolicy;

// =============================================================================
// API Settings
// =============================================================================

/// Where the REST backend lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL of the ticket API (`/tickets` is appended).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Base URL of the license admin API (`/admin/...` is appended).
    #[serde(default = "default_base_url")]
    pub license_base_url: String,

    /// Bounded wait for a single remote call (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout() -> u64 {
    8
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            license_base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Quiet period after the link comes back before a pass starts
    /// (milliseconds).
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// Retry passes after a transport failure before waiting for the next
    /// connectivity change. Set to 0 for infinite retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff between retry passes (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff between retry passes (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Randomization factor applied to each backoff delay (0.0 - 1.0).
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Polling interval for ticket watches (seconds).
    #[serde(default = "default_watch_interval")]
    pub watch_interval_secs: u64,
}

fn default_debounce() -> u64 {
    1000
}
fn default_max_attempts() -> u32 {
    5
}
fn default_initial_backoff() -> u64 {
    1000
}
fn default_max_backoff() -> u64 {
    60
}
fn default_jitter() -> f64 {
    0.5
}
fn default_watch_interval() -> u64 {
    15
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            debounce_ms: default_debounce(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            jitter: default_jitter(),
            watch_interval_secs: default_watch_interval(),
        }
    }
}

// =============================================================================
// Store Settings
// =============================================================================

/// Where local state is kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// SQLite file. `None` uses the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete dashboard sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardConfig {
    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub store: StoreSettings,
}

impl DashboardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (dashboard.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading dashboard config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load dashboard config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Dashboard config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        for (name, raw) in [
            ("base_url", &self.api.base_url),
            ("license_base_url", &self.api.license_base_url),
        ] {
            let url = Url::parse(raw)
                .map_err(|e| SyncError::InvalidUrl(format!("{} '{}': {}", name, raw, e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(SyncError::InvalidUrl(format!(
                    "{} must start with http:// or https://, got: {}",
                    name, raw
                )));
            }
        }

        if self.api.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.sync.jitter) {
            return Err(SyncError::InvalidConfig(format!(
                "jitter must be between 0.0 and 1.0, got {}",
                self.sync.jitter
            )));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ZENCIA_API_URL") {
            debug!(url = %url, "Overriding API URL from environment");
            self.api.base_url = url;
        }

        if let Ok(url) = std::env::var("ZENCIA_LICENSE_API_URL") {
            debug!(url = %url, "Overriding license API URL from environment");
            self.api.license_base_url = url;
        }

        if let Ok(path) = std::env::var("ZENCIA_STORE_PATH") {
            self.store.path = Some(PathBuf::from(path));
        }

        if let Ok(secs) = std::env::var("ZENCIA_REQUEST_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.api.request_timeout_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring non-numeric request timeout"),
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "zencia", "dashboard")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("dashboard.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Store file: the configured path, else the platform data directory.
    pub fn store_path(&self) -> Option<PathBuf> {
        self.store.path.clone().or_else(|| {
            Self::project_dirs().map(|dirs| dirs.data_dir().join("dashboard.db"))
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.sync.debounce_ms)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.sync.watch_interval_secs)
    }

    /// Retry policy described by the `[sync]` section.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.sync.max_attempts,
            initial_delay: Duration::from_millis(self.sync.initial_backoff_ms),
            max_delay: Duration::from_secs(self.sync.max_backoff_secs),
            jitter: self.sync.jitter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DashboardConfig::default();
        assert_eq!(config.api.request_timeout_secs, 8);
        assert_eq!(config.debounce(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = DashboardConfig::default();

        config.api.base_url = "not a url".to_string();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.api.base_url = "ftp://files.example.com".to_string();
        assert!(config.validate().is_err());

        config.api.base_url = "https://api.example.com/api".to_string();
        assert!(config.validate().is_ok());

        config.sync.jitter = 1.5;
        assert!(matches!(config.validate(), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: DashboardConfig = toml::from_str(
            r#"
            [sync]
            debounce_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.sync.debounce_ms, 250);
        assert_eq!(config.sync.max_attempts, 5);
        assert_eq!(config.api.base_url, "http://localhost:8080/api");
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("zencia-{}.toml", uuid::Uuid::new_v4()));
        let mut config = DashboardConfig::default();
        config.sync.max_attempts = 9;
        config.save(Some(path.clone())).unwrap();

        let toml_str = std::fs::read_to_string(&path).unwrap();
        assert!(toml_str.contains("[api]"));
        assert!(toml_str.contains("[sync]"));

        let loaded: DashboardConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(loaded.sync.max_attempts, 9);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = DashboardConfig::default().retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_secs(1));
    }
}
