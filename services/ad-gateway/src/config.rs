//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults. The
//! file carries no secrets; API keys live in the 0600 ledger file that
//! `storage.keys_path` points at.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub admin_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Upstream video-search API settings
#[derive(Debug, Deserialize)]
pub struct UpstreamConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

/// Paths for the persisted stores
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub keys_path: PathBuf,
    pub ads_path: PathBuf,
}

/// Credential pool behavior
#[derive(Debug, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    1000
}

fn default_page_size() -> u32 {
    12
}

fn default_refresh_interval() -> u64 {
    300
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        if !config.upstream.base_url.starts_with("http://")
            && !config.upstream.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "upstream base_url must start with http:// or https://, got: {}",
                config.upstream.base_url
            )));
        }

        if config.upstream.timeout_secs == 0 {
            return Err(common::Error::Config(
                "upstream timeout_secs must be greater than 0".into(),
            ));
        }

        if config.upstream.page_size == 0 || config.upstream.page_size > 50 {
            return Err(common::Error::Config(format!(
                "upstream page_size must be in 1..=50, got {}",
                config.upstream.page_size
            )));
        }

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "server max_connections must be greater than 0".into(),
            ));
        }

        if config.server.listen_addr == config.server.admin_addr {
            return Err(common::Error::Config(
                "admin_addr must differ from listen_addr".into(),
            ));
        }

        if config.pool.refresh_interval_secs == 0 {
            return Err(common::Error::Config(
                "pool refresh_interval_secs must be greater than 0".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("ad-gateway.toml")
    }
}
