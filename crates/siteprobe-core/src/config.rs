//! Configuration management for Siteprobe.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/siteprobe/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP front end settings
    pub server: ServerConfig,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// Scan orchestration settings
    pub scanning: ScanningConfig,
    /// Audit engine settings
    pub audits: AuditConfig,
    /// Database and blob storage settings
    pub storage: StorageConfig,
    /// Out-of-band notification settings
    pub notifications: NotificationConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit path. The file must exist.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }

        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `SITEPROBE_BIND_ADDRESS`: Override the HTTP listen address
    /// - `SITEPROBE_DATABASE_PATH`: Override the SQLite database path
    /// - `SITEPROBE_HEADLESS`: Override browser headless mode (true/false)
    /// - `SITEPROBE_MAX_SESSIONS`: Override the browser session pool size
    /// - `SITEPROBE_RELAY_URL`: Override the notification relay endpoint
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `SITEPROBE_*` overrides from a variable lookup.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("SITEPROBE_BIND_ADDRESS") {
            tracing::debug!("Override server.bind_address from env: {}", val);
            self.server.bind_address = val;
        }

        if let Some(val) = lookup("SITEPROBE_DATABASE_PATH") {
            tracing::debug!("Override storage.database_path from env: {}", val);
            self.storage.database_path = PathBuf::from(val);
        }

        if let Some(val) = lookup("SITEPROBE_HEADLESS") {
            match val.parse() {
                Ok(headless) => {
                    self.browser.headless = headless;
                    tracing::debug!("Override browser.headless from env: {}", headless);
                }
                Err(_) => tracing::warn!("Ignoring invalid SITEPROBE_HEADLESS value '{}'", val),
            }
        }

        if let Some(val) = lookup("SITEPROBE_MAX_SESSIONS") {
            match val.parse() {
                Ok(max) => {
                    self.browser.max_sessions = max;
                    tracing::debug!("Override browser.max_sessions from env: {}", max);
                }
                Err(_) => tracing::warn!("Ignoring invalid SITEPROBE_MAX_SESSIONS value '{}'", val),
            }
        }

        if let Some(val) = lookup("SITEPROBE_RELAY_URL") {
            tracing::debug!("Override notifications.relay_url from env: {}", val);
            self.notifications.relay_url = Some(val).filter(|v| !v.is_empty());
        }
    }

    /// Reject values the orchestrator cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.browser.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "browser.max_sessions".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.scanning.setup_progress == 0 || self.scanning.setup_progress >= 50 {
            return Err(ConfigError::InvalidValue {
                field: "scanning.setup_progress".to_string(),
                reason: "must be between 1 and 49".to_string(),
            });
        }
        if self.browser.navigation_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "browser.navigation_timeout_secs".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/siteprobe/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        Ok(project_dirs()?.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/siteprobe`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        Ok(project_dirs()?.data_dir().to_path_buf())
    }
}

fn project_dirs() -> ConfigResult<ProjectDirs> {
    ProjectDirs::from("dev", "siteprobe", "siteprobe").ok_or(ConfigError::NoConfigDir)
}

/// HTTP front end settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Explicit Chrome/Chromium binary; auto-detected when unset
    pub executable: Option<PathBuf>,
    /// Page viewport width used for audits
    pub viewport_width: u32,
    /// Page viewport height used for audits
    pub viewport_height: u32,
    /// Client identifier sent as the user agent
    pub user_agent: String,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
    /// Maximum concurrently open browser sessions
    pub max_sessions: usize,
    /// How long a scan waits for a free session before failing
    pub acquire_timeout_secs: u64,
}

impl BrowserConfig {
    /// Navigation timeout as a `Duration`.
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    /// Session acquisition timeout as a `Duration`.
    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            viewport_width: 1920,
            viewport_height: 1080,
            user_agent: format!(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                 Chrome/120.0.0.0 Safari/537.36 Siteprobe/{}",
                env!("CARGO_PKG_VERSION")
            ),
            navigation_timeout_secs: 60,
            max_sessions: 4,
            acquire_timeout_secs: 300,
        }
    }
}

/// Scan orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanningConfig {
    /// Progress checkpoint reached once navigation succeeds
    pub setup_progress: u8,
    /// Upper bound on one module's run time in seconds
    pub module_timeout_secs: u64,
    /// Upper bound on a whole scan in seconds
    pub scan_timeout_secs: u64,
    /// Capture per-viewport screenshots before the modules run
    pub capture_screenshots: bool,
    /// Console messages retained per capture scope
    pub max_console_messages: usize,
    /// Wait after page load before reading console output, in milliseconds
    pub settle_delay_ms: u64,
}

impl ScanningConfig {
    /// Module timeout as a `Duration`.
    #[must_use]
    pub fn module_timeout(&self) -> Duration {
        Duration::from_secs(self.module_timeout_secs)
    }

    /// Scan timeout as a `Duration`.
    #[must_use]
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            setup_progress: 10,
            module_timeout_secs: 180,
            scan_timeout_secs: 900,
            capture_screenshots: true,
            max_console_messages: 500,
            settle_delay_ms: 1000,
        }
    }
}

/// Audit engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Lighthouse CLI executable
    pub lighthouse_bin: String,
    /// Path to `axe.min.js`
    pub axe_script_path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            lighthouse_bin: "lighthouse".to_string(),
            axe_script_path: None,
        }
    }
}

/// Database and blob storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file (`:memory:` for ephemeral)
    pub database_path: PathBuf,
    /// Directory screenshots are written to
    pub screenshot_dir: PathBuf,
    /// Public URL prefix under which `screenshot_dir` is served
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("siteprobe.db"),
            screenshot_dir: PathBuf::from("screenshots"),
            public_base_url: "/screenshots".to_string(),
        }
    }
}

/// Out-of-band notification settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Endpoint that receives JSON progress messages; disabled when unset
    pub relay_url: Option<String>,
}
