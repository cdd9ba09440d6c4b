//! Process configuration.
//!
//! A `config.toml` on disk provides defaults, and a handful of fields can be
//! overridden from the environment at process start. Credentials that are
//! unusable fail construction with a clear error rather than failing later
//! inside the coordinator.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub host: Ipv4Addr,
    pub port: u16,
    pub client_id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Bounded number of in-flight upstream slots.
    #[serde(default = "defaults::slots")]
    pub slots: usize,
    /// Requests per interval permitted by the token bucket.
    #[serde(default = "defaults::rate_limit_per_sec")]
    pub rate_limit_per_sec: u32,
    /// Per-request timeout waiting on the upstream.
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Dwell timeout: how long a request may wait in queue before it is
    /// dropped for having missed its deadline.
    #[serde(default = "defaults::queue_dwell_secs")]
    pub queue_dwell_secs: u64,
    /// Bounded retry attempts for transient upstream errors.
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "defaults::bar_cache_capacity")]
    pub max_bars: usize,
    #[serde(default = "defaults::bar_ttl_secs")]
    pub bar_ttl_secs: u64,
    #[serde(default = "defaults::calendar_ttl_secs")]
    pub calendar_ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "defaults::bind_addr")]
    pub bind_addr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub upstream: UpstreamConfig,
    #[serde(default = "CoordinatorConfig::default")]
    pub coordinator: CoordinatorConfig,
    #[serde(default = "CacheConfig::default")]
    pub cache: CacheConfig,
    #[serde(default = "HttpConfig::default")]
    pub http: HttpConfig,
}

mod defaults {
    pub fn slots() -> usize {
        50
    }
    pub fn rate_limit_per_sec() -> u32 {
        45
    }
    pub fn request_timeout_secs() -> u64 {
        30
    }
    pub fn queue_dwell_secs() -> u64 {
        60
    }
    pub fn max_retries() -> u32 {
        5
    }
    pub fn bar_cache_capacity() -> usize {
        2_000_000
    }
    pub fn bar_ttl_secs() -> u64 {
        24 * 3600
    }
    pub fn calendar_ttl_secs() -> u64 {
        24 * 3600
    }
    pub fn bind_addr() -> String {
        "0.0.0.0:8080".to_owned()
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            slots: defaults::slots(),
            rate_limit_per_sec: defaults::rate_limit_per_sec(),
            request_timeout_secs: defaults::request_timeout_secs(),
            queue_dwell_secs: defaults::queue_dwell_secs(),
            max_retries: defaults::max_retries(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bars: defaults::bar_cache_capacity(),
            bar_ttl_secs: defaults::bar_ttl_secs(),
            calendar_ttl_secs: defaults::calendar_ttl_secs(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: defaults::bind_addr(),
        }
    }
}

impl Config {
    /// Load from a TOML file at `path`, then apply `QUANTDESK_*` environment
    /// overrides for the upstream credentials (host/port/client id/username/
    /// password), so a deployment need not bake credentials into the file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Invariant(format!("could not read config file {}: {e}", path.display()))
        })?;
        let mut config: Self = toml::from_str(&raw)
            .map_err(|e| Error::Invariant(format!("invalid config.toml: {e}")))?;
        config.apply_env_overrides();
        config.validate()
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("QUANTDESK_UPSTREAM_HOST") {
            if let Ok(parsed) = host.parse() {
                self.upstream.host = parsed;
            }
        }
        if let Ok(port) = std::env::var("QUANTDESK_UPSTREAM_PORT") {
            if let Ok(parsed) = port.parse() {
                self.upstream.port = parsed;
            }
        }
        if let Ok(client_id) = std::env::var("QUANTDESK_UPSTREAM_CLIENT_ID") {
            if let Ok(parsed) = client_id.parse() {
                self.upstream.client_id = parsed;
            }
        }
        if let Ok(user) = std::env::var("QUANTDESK_UPSTREAM_USERNAME") {
            self.upstream.username = Some(user);
        }
        if let Ok(pass) = std::env::var("QUANTDESK_UPSTREAM_PASSWORD") {
            self.upstream.password = Some(pass);
        }
        if let Ok(addr) = std::env::var("QUANTDESK_HTTP_BIND") {
            self.http.bind_addr = addr;
        }
    }

    /// The process fails to start with a clear error if credentials are
    /// unusable.
    fn validate(self) -> Result<Self> {
        if self.upstream.port == 0 {
            return Err(Error::Invariant(
                "upstream.port must be a nonzero TCP port".into(),
            ));
        }
        if let (Some(user), None) | (None, Some(user)) =
            (&self.upstream.username, &self.upstream.password)
        {
            return Err(Error::Invariant(format!(
                "upstream username/password must both be set or both omitted (got username={user:?} with the other missing)"
            )));
        }
        Ok(self)
    }
}
