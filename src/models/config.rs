//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::tunnel::Tunnel;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Feed access settings
    #[serde(default)]
    pub feed: FeedConfig,

    /// Monitoring behavior settings
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Tunnels to watch
    #[serde(default = "defaults::tunnels")]
    pub tunnels: Vec<Tunnel>,
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
        if self.feed.base_url.trim().is_empty() {
            return Err(AppError::validation("feed.base_url is empty"));
        }
        url::Url::parse(&self.feed.base_url)
            .map_err(|e| AppError::validation(format!("feed.base_url is invalid: {}", e)))?;
        if self.feed.user_agent.trim().is_empty() {
            return Err(AppError::validation("feed.user_agent is empty"));
        }
        if self.feed.timeout_secs == 0 {
            return Err(AppError::validation("feed.timeout_secs must be > 0"));
        }
        if self.monitor.check_interval_ms == 0 {
            return Err(AppError::validation("monitor.check_interval_ms must be > 0"));
        }
        if self.tunnels.is_empty() {
            return Err(AppError::validation("No tunnels defined"));
        }
        for tunnel in &self.tunnels {
            if tunnel.key.trim().is_empty() || tunnel.name.trim().is_empty() {
                return Err(AppError::validation("Tunnel key and name must be set"));
            }
            if tunnel.search_terms.is_empty() {
                return Err(AppError::validation(format!(
                    "Tunnel '{}' has no search terms",
                    tunnel.key
                )));
            }
        }
        let mut keys: Vec<&str> = self.tunnels.iter().map(|t| t.key.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();
        if keys.len() != self.tunnels.len() {
            return Err(AppError::validation("Duplicate tunnel keys"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            monitor: MonitorConfig::default(),
            tunnels: defaults::tunnels(),
        }
    }
}

/// Feed access settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base URL of the traffic feed
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Relay route prefixes tried, in order, when direct access fails.
    /// The encoded target URL is appended to the prefix.
    #[serde(default = "defaults::relays")]
    pub relays: Vec<String>,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            relays: defaults::relays(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Monitoring behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between check passes in milliseconds
    #[serde(default = "defaults::check_interval")]
    pub check_interval_ms: u64,

    /// Whether transitions raise alerts
    #[serde(default)]
    pub notifications_enabled: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: defaults::check_interval(),
            notifications_enabled: false,
        }
    }
}

mod defaults {
    use crate::models::tunnel::Tunnel;

    // Feed defaults
    pub fn base_url() -> String {
        "https://www.rwsverkeersinfo.nl/files/".into()
    }
    pub fn relays() -> Vec<String> {
        vec![
            "https://api.allorigins.win/raw?url=".into(),
            "https://cors-anywhere.herokuapp.com/".into(),
            "https://api.codetabs.com/v1/proxy?quest=".into(),
        ]
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; tunnelwatch/1.0)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Monitor defaults
    pub fn check_interval() -> u64 {
        60_000
    }

    // Tunnel defaults
    pub fn tunnels() -> Vec<Tunnel> {
        vec![
            Tunnel {
                key: "roermond".to_string(),
                name: "Roermond".to_string(),
                search_terms: vec![
                    "roermond".to_string(),
                    "a73".to_string(),
                    "tunnel roermond".to_string(),
                    "roermond tunnel".to_string(),
                ],
            },
            Tunnel {
                key: "swalmen".to_string(),
                name: "Swalmen".to_string(),
                search_terms: vec![
                    "swalmen".to_string(),
                    "a73".to_string(),
                    "tunnel swalmen".to_string(),
                    "swalmen tunnel".to_string(),
                ],
            },
        ]
    }
}
