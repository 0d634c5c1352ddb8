//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Remote group whose board is mirrored
    #[serde(default)]
    pub group_id: i64,

    /// Remote API endpoint settings
    #[serde(default)]
    pub remote: RemoteConfig,

    /// One entry per authenticated session
    #[serde(default)]
    pub accounts: Vec<Account>,

    /// Topic discovery behavior
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Topic detail fetching
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Persistence destination
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.group_id <= 0 {
            return Err(AppError::config("group_id must be > 0"));
        }
        if self.remote.api_base.trim().is_empty() {
            return Err(AppError::config("remote.api_base is empty"));
        }
        if self.remote.user_agent.trim().is_empty() {
            return Err(AppError::config("remote.user_agent is empty"));
        }
        if self.remote.timeout_secs == 0 {
            return Err(AppError::config("remote.timeout_secs must be > 0"));
        }
        if self.accounts.is_empty() {
            return Err(AppError::config("No accounts defined"));
        }
        if let Some(account) = self
            .accounts
            .iter()
            .find(|a| a.access_token.trim().is_empty())
        {
            return Err(AppError::config(format!(
                "Account '{}' has no access_token",
                account.name
            )));
        }
        if self.discovery.page_size == 0 {
            return Err(AppError::config("discovery.page_size must be > 0"));
        }
        if self.discovery.max_page_failures == 0 {
            return Err(AppError::config("discovery.max_page_failures must be > 0"));
        }
        if self.fetch.comment_page_size == 0 {
            return Err(AppError::config("fetch.comment_page_size must be > 0"));
        }
        if self.storage.destination.trim().is_empty() {
            return Err(AppError::config("storage.destination is empty"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            group_id: 0,
            remote: RemoteConfig::default(),
            accounts: Vec::new(),
            discovery: DiscoveryConfig::default(),
            fetch: FetchConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Remote API settings shared by all sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the method API
    #[serde(default = "defaults::api_base")]
    pub api_base: String,

    /// API version sent with every call
    #[serde(default = "defaults::api_version")]
    pub api_version: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between requests of one session in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::api_base(),
            api_version: defaults::api_version(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
        }
    }
}

/// Credentials of one remote account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Label used in logs
    #[serde(default)]
    pub name: String,

    /// Pre-issued access token
    pub access_token: String,
}

/// Discovery policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// Page through the whole listing once
    #[default]
    All,
    /// Poll the first page of recently updated topics
    Recent,
}

impl std::str::FromStr for DiscoveryMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "all" => Ok(DiscoveryMode::All),
            "recent" | "recents" => Ok(DiscoveryMode::Recent),
            other => Err(AppError::config(format!(
                "Unknown discovery mode '{other}' (expected 'all' or 'recent')"
            ))),
        }
    }
}

/// Topic discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub mode: DiscoveryMode,

    /// Topics requested per listing page
    #[serde(default = "defaults::page_size")]
    pub page_size: usize,

    /// Keep tailing recent topics until cancelled
    #[serde(default)]
    pub continuous: bool,

    /// Pause between polls, also used before retrying a failed page
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_ms: u64,

    /// Consecutive page failures tolerated before discovery gives up
    #[serde(default = "defaults::max_page_failures")]
    pub max_page_failures: usize,
}

impl DiscoveryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::default(),
            page_size: defaults::page_size(),
            continuous: false,
            poll_interval_ms: defaults::poll_interval(),
            max_page_failures: defaults::max_page_failures(),
        }
    }
}

/// Topic detail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Comments requested per detail page
    #[serde(default = "defaults::comment_page_size")]
    pub comment_page_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            comment_page_size: defaults::comment_page_size(),
        }
    }
}

/// Storage destination settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `file://<dir>` or `sqlite://<path>`
    #[serde(default = "defaults::destination")]
    pub destination: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            destination: defaults::destination(),
        }
    }
}

mod defaults {
    // Remote defaults
    pub fn api_base() -> String {
        "https://api.vk.com/method/".into()
    }
    pub fn api_version() -> String {
        "5.131".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; board-backup/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        350
    }

    // Discovery defaults
    pub fn page_size() -> usize {
        100
    }
    pub fn poll_interval() -> u64 {
        500
    }
    pub fn max_page_failures() -> usize {
        5
    }

    // Fetch defaults
    pub fn comment_page_size() -> usize {
        100
    }

    // Storage defaults
    pub fn destination() -> String {
        "file://backup".into()
    }
}
