use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Storage backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./vps-watch.db")
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub alerts: AlertConfig,

    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout: u64,

    /// Number of servers requested per listing
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: default_api_timeout(),
            page_size: default_page_size(),
        }
    }
}

fn default_base_url() -> String {
    "https://vps.danbot.cloud/api/".to_string()
}

fn default_api_timeout() -> u64 {
    30
}

fn default_page_size() -> usize {
    100
}

/// Poll loop timing, all values in seconds
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    /// Foreground interval while the agent delivers data
    #[serde(default = "default_foreground_interval")]
    pub foreground_interval: u64,

    /// Foreground interval on the standard source
    #[serde(default = "default_fallback_interval")]
    pub fallback_interval: u64,

    #[serde(default = "default_background_interval")]
    pub background_interval: u64,

    #[serde(default = "default_rate_limit_backoff")]
    pub rate_limit_backoff: u64,

    #[serde(default = "default_agent_timeout")]
    pub agent_timeout: u64,

    /// How long a standard-source snapshot may serve as merge baseline
    #[serde(default = "default_baseline_ttl")]
    pub baseline_ttl: u64,
}

impl PollingConfig {
    pub fn foreground_interval(&self, using_agent: bool) -> Duration {
        if using_agent {
            Duration::from_secs(self.foreground_interval)
        } else {
            Duration::from_secs(self.fallback_interval)
        }
    }

    pub fn background_interval(&self) -> Duration {
        Duration::from_secs(self.background_interval)
    }

    /// Rate limit pause, never shorter than the 5 second floor
    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_secs(self.rate_limit_backoff.max(MIN_RATE_LIMIT_BACKOFF))
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout)
    }

    pub fn baseline_ttl(&self) -> Duration {
        Duration::from_secs(self.baseline_ttl)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            foreground_interval: default_foreground_interval(),
            fallback_interval: default_fallback_interval(),
            background_interval: default_background_interval(),
            rate_limit_backoff: default_rate_limit_backoff(),
            agent_timeout: default_agent_timeout(),
            baseline_ttl: default_baseline_ttl(),
        }
    }
}

const MIN_RATE_LIMIT_BACKOFF: u64 = 5;

fn default_foreground_interval() -> u64 {
    15
}

fn default_fallback_interval() -> u64 {
    30
}

fn default_background_interval() -> u64 {
    60
}

fn default_rate_limit_backoff() -> u64 {
    MIN_RATE_LIMIT_BACKOFF
}

fn default_agent_timeout() -> u64 {
    3
}

fn default_baseline_ttl() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    /// Minimum seconds between two CPU alerts for the same server
    #[serde(default = "default_cpu_cooldown")]
    pub cpu_cooldown: u64,

    pub webhook: Option<Webhook>,
}

impl AlertConfig {
    pub fn cpu_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cpu_cooldown as i64)
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            cpu_cooldown: default_cpu_cooldown(),
            webhook: None,
        }
    }
}

fn default_cpu_cooldown() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct Webhook {
    pub url: String,
}

/// Per-server user settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSettings {
    #[serde(default)]
    pub alerts: AlertSettings,

    #[serde(default)]
    pub agent: AgentEndpoint,
}

impl ResourceSettings {
    /// A server is monitored in the background iff any alert flag is set
    pub fn is_monitored(&self) -> bool {
        self.alerts.any_enabled()
    }

    pub fn agent_enabled(&self) -> bool {
        self.agent.enabled
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertSettings {
    #[serde(default)]
    pub cpu_enabled: bool,

    /// CPU usage percentage at which an alert fires
    #[serde(default = "default_cpu_threshold")]
    pub cpu_threshold: u8,

    #[serde(default)]
    pub notify_offline: bool,

    #[serde(default)]
    pub notify_online: bool,
}

impl AlertSettings {
    pub fn any_enabled(&self) -> bool {
        self.cpu_enabled || self.notify_offline || self.notify_online
    }
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            cpu_enabled: false,
            cpu_threshold: default_cpu_threshold(),
            notify_offline: false,
            notify_online: false,
        }
    }
}

fn default_cpu_threshold() -> u8 {
    85
}

/// Where to reach the optional per-server agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEndpoint {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub host: String,

    #[serde(default = "crate::config::default_agent_port")]
    pub port: u16,

    #[serde(default)]
    pub token: String,
}

impl AgentEndpoint {
    pub fn stats_url(&self) -> String {
        format!("http://{}:{}/stats", self.host, self.port)
    }
}

impl Default for AgentEndpoint {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: default_agent_port(),
            token: String::new(),
        }
    }
}

pub fn default_agent_port() -> u16 {
    8765
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
