//! Configuration types for the home monitor service

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use hm_client::Endpoints;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

/// GraphQL backend endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_http_url")]
    pub http_url: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            http_url: default_http_url(),
            ws_url: default_ws_url(),
        }
    }
}

impl ApiConfig {
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            http_url: self.http_url.clone(),
            ws_url: self.ws_url.clone(),
        }
    }
}

/// Where the session is persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Sensor subscription reconnect policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_seconds: u64,
    /// Unlimited when absent
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            reconnect_interval_seconds: default_reconnect_interval(),
            max_reconnect_attempts: None,
        }
    }
}

impl FeedConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_seconds)
    }
}

fn default_http_url() -> String {
    "http://localhost:3000/graphql".to_string()
}

fn default_ws_url() -> String {
    "ws://localhost:3000/graphql".to_string()
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("home-monitor-session.json")
}

fn default_reconnect_interval() -> u64 {
    5
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> crate::Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::MonitorError::Config(format!("Failed to read config file {:?}: {}", path, e))
    })?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
