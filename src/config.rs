//! Configuration parsing and validation for the relay server
//!
//! This module handles command-line argument parsing and validation using clap. Every option can
//! also be supplied through the environment.
use anyhow::anyhow;
use clap::Parser;
use ollama_relay::client::PoolSettings;
use ollama_relay::upstream::DEFAULT_UPSTREAM_URL;
use std::net::IpAddr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// The address on which the relay will listen.
    #[arg(long, env = "RELAY_HOST", default_value = "127.0.0.1")]
    pub host: IpAddr,

    /// The port on which the relay will listen.
    #[arg(short = 'p', long, env = "RELAY_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Base URL of the Ollama server requests are forwarded to.
    #[arg(short = 'u', long, env = "RELAY_UPSTREAM_URL", default_value = DEFAULT_UPSTREAM_URL)]
    pub upstream_url: Url,

    /// Largest accepted request body, in bytes.
    #[arg(long, env = "RELAY_BODY_LIMIT", default_value_t = ollama_relay::DEFAULT_BODY_LIMIT)]
    pub body_limit: usize,

    /// Whether to serve prometheus metrics.
    #[arg(short = 'm', long, env = "RELAY_METRICS", default_value_t = false)]
    pub metrics: bool,

    /// The port on which the metrics server will listen.
    #[arg(long, env = "RELAY_METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,

    /// The prefix to use for metrics.
    #[arg(long, default_value = "relay")]
    pub metrics_prefix: String,

    /// Maximum number of idle connections to keep alive to the upstream.
    #[arg(long, env = "RELAY_POOL_MAX_IDLE_PER_HOST", default_value_t = 100)]
    pub pool_max_idle_per_host: usize,

    /// How long (in seconds) to keep idle upstream connections alive.
    #[arg(long, env = "RELAY_POOL_IDLE_TIMEOUT_SECS", default_value_t = 90)]
    pub pool_idle_timeout_secs: u64,
}

impl Config {
    pub fn validate(self) -> Result<Self, anyhow::Error> {
        if !matches!(self.upstream_url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "Upstream URL '{}' must use http or https",
                self.upstream_url
            ));
        }
        if self.upstream_url.host().is_none() {
            return Err(anyhow!("Upstream URL '{}' has no host", self.upstream_url));
        }
        if self.body_limit == 0 {
            return Err(anyhow!("Body limit must be greater than zero"));
        }
        if self.metrics && self.metrics_port == self.port {
            return Err(anyhow!(
                "Metrics port {} clashes with the relay port",
                self.metrics_port
            ));
        }
        Ok(self)
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            idle_timeout: Duration::from_secs(self.pool_idle_timeout_secs),
            max_idle_per_host: self.pool_max_idle_per_host,
        }
    }
}
