//! Gateway configuration
//!
//! Every field has a default, so an empty YAML document (or no file at all)
//! yields a working setup: data plane on 8080, control plane on 8081, a
//! 200-token bucket refilled every second.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, ensure};
use serde::Deserialize;

/// Environment variable naming a YAML config file.
pub const CONFIG_ENV: &str = "GATEKEEPER_CONFIG";
/// Overrides `server.data_listen_addr`.
pub const DATA_LISTEN_ENV: &str = "DATA_LISTEN";
/// Overrides `server.control_listen_addr`.
pub const CONTROL_LISTEN_ENV: &str = "CONTROL_LISTEN";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub admission: AdmissionConfig,
    pub registry: RegistryConfig,
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Client-facing listener
    pub data_listen_addr: String,
    /// Backend self-registration listener
    pub control_listen_addr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStrategy {
    #[default]
    TokenBucket,
    Random,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    pub strategy: AdmissionStrategy,
    /// Bucket capacity (token bucket only)
    pub max_tokens: u32,
    /// Time between hard refills, in milliseconds (token bucket only)
    pub refill_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Backends silent for longer than this are evicted
    pub stale_after_secs: u64,
    /// How often the reaper runs; 0 disables it
    pub prune_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub connect_timeout_ms: u64,
    /// Budget for writing the request and reading the full response
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_listen_addr: "0.0.0.0:8080".to_string(),
            control_listen_addr: "0.0.0.0:8081".to_string(),
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            strategy: AdmissionStrategy::TokenBucket,
            max_tokens: crate::admission::MAX_TOKENS,
            refill_interval_ms: 1000,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 30,
            prune_interval_secs: 5,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl RegistryConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn prune_interval(&self) -> Option<Duration> {
        (self.prune_interval_secs > 0).then(|| Duration::from_secs(self.prune_interval_secs))
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Config {
    /// Loads the file named by `GATEKEEPER_CONFIG` (defaults when unset), then
    /// applies `DATA_LISTEN` / `CONTROL_LISTEN` overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        cfg.apply_overrides(|key| std::env::var(key).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        // An empty document deserializes to unit, not an empty map
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Self = serde_yaml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Applies listen-address overrides from `lookup` (the process environment
    /// in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup(DATA_LISTEN_ENV) {
            self.server.data_listen_addr = addr;
        }
        if let Some(addr) = lookup(CONTROL_LISTEN_ENV) {
            self.server.control_listen_addr = addr;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.admission.max_tokens > 0, "admission.max_tokens must be greater than 0");
        ensure!(
            self.admission.refill_interval_ms > 0,
            "admission.refill_interval_ms must be greater than 0"
        );
        ensure!(
            self.registry.stale_after_secs > 0,
            "registry.stale_after_secs must be greater than 0"
        );
        ensure!(
            self.upstream.connect_timeout_ms > 0 && self.upstream.request_timeout_ms > 0,
            "upstream timeouts must be greater than 0"
        );
        Ok(())
    }
}
