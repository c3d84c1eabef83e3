//! Configuration infrastructure
//!
//! Configuration is organized into three tiers:
//! 1. Backend connection settings (`api`)
//! 2. Upload workflow and logging settings (`upload`, `logging`)
//! 3. Application-managed settings, updated by the app itself (`app_managed`)
//!
//! The file lives at `<config dir>/marketplace-ops/config.json` and is created
//! with defaults on first use.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

pub const APP_DIR_NAME: &str = "marketplace-ops";
const CONFIG_FILE_NAME: &str = "config.json";
const CURRENT_CONFIG_VERSION: u32 = 1;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub app_managed: AppManagedConfig,
}

/// Backend connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// REST API root, e.g. `https://ops.example.com/api/v1`
    pub base_url: String,

    /// Value for the `X-Tenant-ID` header; normally resolved from the session
    pub tenant_id: Option<String>,

    /// Request timeout in seconds (0 disables the client-side timeout)
    pub request_timeout_seconds: u64,

    pub user_agent: String,
}

/// Upload workflow settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Delay before the single follow-up status poll
    pub poll_delay_ms: u64,

    /// Advisory file type filter
    pub accepted_extensions: Vec<String>,

    /// File name used when saving the downloaded template
    pub template_file_name: String,
}

impl UploadConfig {
    pub const fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Enable console output (stderr, so stdout stays machine-readable)
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,

    /// Offset from UTC, in hours, used for log timestamps
    pub utc_offset_hours: i32,

    /// Module-specific log level filters (e.g., "reqwest": "warn")
    pub module_filters: HashMap<String, String>,
}

/// Application-managed settings that are automatically updated by the app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppManagedConfig {
    /// Vendor used by the last successful command
    pub last_vendor_id: Option<String>,

    /// Store used by the last successful command
    pub last_store_id: Option<String>,

    /// Batch id of the last accepted upload
    pub last_batch_id: Option<String>,

    /// Configuration version for migration purposes
    pub config_version: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::API_BASE_URL.to_string(),
            tenant_id: None,
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            user_agent: format!("marketplace-ops/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for AppManagedConfig {
    fn default() -> Self {
        Self {
            last_vendor_id: None,
            last_store_id: None,
            last_batch_id: None,
            config_version: CURRENT_CONFIG_VERSION,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            poll_delay_ms: defaults::POLL_DELAY_MS,
            accepted_extensions: defaults::ACCEPTED_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            template_file_name: defaults::TEMPLATE_FILE_NAME.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: defaults::LOG_AUTO_CLEANUP,
            utc_offset_hours: 0,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

impl AppConfig {
    /// Apply command-line / environment overrides on top of the stored file.
    pub fn apply_overrides(&mut self, base_url: Option<String>, tenant_id: Option<String>) {
        if let Some(base_url) = base_url.filter(|url| !url.trim().is_empty()) {
            self.api.base_url = base_url;
        }
        if let Some(tenant_id) = tenant_id.filter(|tenant| !tenant.trim().is_empty()) {
            self.api.tenant_id = Some(tenant_id);
        }
    }
}

/// Loads and saves [`AppConfig`] as pretty-printed JSON
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Get configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(APP_DIR_NAME);
        Ok(config_dir)
    }

    /// Get application data directory (logs, downloaded templates)
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join(APP_DIR_NAME);
        Ok(data_dir)
    }

    pub fn new() -> Result<Self> {
        Ok(Self {
            config_path: Self::get_config_dir()?.join(CONFIG_FILE_NAME),
        })
    }

    /// Use an explicit config file instead of the per-user default
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(mut config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                if self.migrate_config_if_needed(&mut config).await? {
                    info!("Configuration migrated to version {}", config.app_managed.config_version);
                }
                Ok(config)
            }
            Err(parse_error) => {
                warn!("⚠️  Configuration file is unreadable: {}", parse_error);
                self.backup_corrupted().await;

                let default_config = AppConfig::default();
                self.save_config(&default_config)
                    .await
                    .context("Failed to save default configuration")?;
                info!("✅ Reset to default configuration");
                Ok(default_config)
            }
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Update app-managed settings (like the last used vendor)
    pub async fn update_app_managed<F>(&self, updater: F) -> Result<()>
    where
        F: FnOnce(&mut AppManagedConfig),
    {
        let mut config = self.load_config().await?;
        updater(&mut config.app_managed);
        self.save_config(&config).await
    }

    /// Reset configuration to defaults (useful for troubleshooting)
    pub async fn reset_to_defaults(&self) -> Result<AppConfig> {
        info!("🔄 Resetting configuration to defaults");
        let default_config = AppConfig::default();
        self.save_config(&default_config).await?;
        Ok(default_config)
    }

    /// Migrate configuration from older versions
    pub async fn migrate_config_if_needed(&self, config: &mut AppConfig) -> Result<bool> {
        if config.app_managed.config_version >= CURRENT_CONFIG_VERSION {
            return Ok(false);
        }

        info!(
            "🔄 Migrating configuration from version {} to {}",
            config.app_managed.config_version, CURRENT_CONFIG_VERSION
        );
        // Version 0 files predate the accepted-extension filter.
        if config.upload.accepted_extensions.is_empty() {
            config.upload.accepted_extensions = UploadConfig::default().accepted_extensions;
        }
        config.app_managed.config_version = CURRENT_CONFIG_VERSION;

        self.save_config(config).await?;
        Ok(true)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    async fn backup_corrupted(&self) {
        let backup_path = self.config_path.with_extension("json.corrupted");
        match fs::copy(&self.config_path, &backup_path).await {
            Ok(_) => info!("Backed up corrupted config to: {:?}", backup_path),
            Err(e) => warn!("Failed to create backup of corrupted config: {}", e),
        }
    }
}

/// Default configuration values
pub mod defaults {
    /// Default backend root
    pub const API_BASE_URL: &str = "http://localhost:8000/api/v1";

    /// Default request timeout in seconds
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 120;

    /// Delay before the single follow-up status poll
    pub const POLL_DELAY_MS: u64 = 2000;

    /// Accepted upload file types
    pub const ACCEPTED_EXTENSIONS: &[&str] = &[".csv"];

    /// Saved name of the downloaded template
    pub const TEMPLATE_FILE_NAME: &str = "bulk-upload-template.csv";

    /// Default log level
    pub const LOG_LEVEL: &str = "info";

    /// Default JSON format setting
    pub const LOG_JSON_FORMAT: bool = false;

    /// Default console output setting
    pub const LOG_CONSOLE_OUTPUT: bool = true;

    /// Default file output setting
    pub const LOG_FILE_OUTPUT: bool = true;

    /// Default maximum log files to keep
    pub const LOG_MAX_FILES: u32 = 5;

    /// Default auto cleanup logs setting
    pub const LOG_AUTO_CLEANUP: bool = true;
}
