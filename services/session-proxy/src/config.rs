//! Configuration types and loading
//!
//! Config precedence: CLI `--config` > `CONFIG_PATH` env var > default path.
//! The `[session]` table is optional; every field has a default.

use serde::Deserialize;
use session_refresh::RefreshConfig;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// HTTP proxy settings
#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    /// API base URL; also serves the session endpoints
    pub upstream_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Session cookie and refresh settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub access_cookie: String,
    pub refresh_cookie: String,
    pub ttl_days: u64,
    pub refresh_timeout_secs: u64,
    /// Where guarded requests without a usable session are redirected
    pub sign_in_path: String,
    pub secure_cookies: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            access_cookie: session_auth::ACCESS_TOKEN_COOKIE.to_string(),
            refresh_cookie: session_auth::REFRESH_TOKEN_COOKIE.to_string(),
            ttl_days: 30,
            refresh_timeout_secs: 10,
            sign_in_path: "/".to_string(),
            secure_cookies: false,
        }
    }
}

impl SessionConfig {
    pub fn credential_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_days * 24 * 60 * 60)
    }

    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            credential_ttl: self.credential_ttl(),
            timeout: Duration::from_secs(self.refresh_timeout_secs),
        }
    }
}

fn default_timeout() -> u64 {
    60
}

fn default_max_connections() -> usize {
    1000
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.proxy.upstream_url.starts_with("http://")
            && !self.proxy.upstream_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "upstream_url must start with http:// or https://, got: {}",
                self.proxy.upstream_url
            )));
        }

        if self.proxy.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.proxy.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        let session = &self.session;
        if session.ttl_days == 0 {
            return Err(common::Error::Config(
                "session.ttl_days must be greater than 0".into(),
            ));
        }

        if session.refresh_timeout_secs == 0 {
            return Err(common::Error::Config(
                "session.refresh_timeout_secs must be greater than 0".into(),
            ));
        }

        if session.access_cookie.is_empty() || session.refresh_cookie.is_empty() {
            return Err(common::Error::Config(
                "session cookie names must not be empty".into(),
            ));
        }

        if session.access_cookie == session.refresh_cookie {
            return Err(common::Error::Config(format!(
                "access_cookie and refresh_cookie must differ, both are {}",
                session.access_cookie
            )));
        }

        if !session.sign_in_path.starts_with('/') {
            return Err(common::Error::Config(format!(
                "sign_in_path must be an absolute path, got: {}",
                session.sign_in_path
            )));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("session-proxy.toml")
    }
}
