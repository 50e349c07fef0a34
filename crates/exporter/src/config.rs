//! Exporter configuration

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::ConfigBuilder;
use exporter_lib::fetcher::{DockerClientConfig, DEFAULT_DOCKER_HOST};
use exporter_lib::health::DEFAULT_UNREADY_AFTER_FAILURES;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Prefix of the exporter's own environment overrides
const ENV_PREFIX: &str = "SWARM_EXPORTER";

/// Docker CLI variables used as defaults, below the file and prefixed overrides
const DOCKER_ENV_DEFAULTS: &[(&str, &str)] = &[
    ("DOCKER_HOST", "docker_host"),
    ("DOCKER_API_VERSION", "docker_api_version"),
    ("DOCKER_CERT_PATH", "docker_cert_path"),
];

/// Exporter configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    /// Address the metrics server binds to
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Port the metrics server listens on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Docker daemon, in `DOCKER_HOST` syntax
    #[serde(default = "default_docker_host")]
    pub docker_host: String,

    /// Pin the Docker Engine API version (e.g. "1.43")
    #[serde(default)]
    pub docker_api_version: Option<String>,

    /// Directory with ca.pem, cert.pem and key.pem for TLS
    #[serde(default)]
    pub docker_cert_path: Option<PathBuf>,

    /// Verify the daemon's TLS certificate
    #[serde(default)]
    pub docker_tls_verify: bool,

    /// Timeout for each Docker API request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Consecutive failed scrapes before /readyz reports not ready
    #[serde(default = "default_unready_after_failures")]
    pub unready_after_failures: u32,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    9675
}

fn default_docker_host() -> String {
    DEFAULT_DOCKER_HOST.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_unready_after_failures() -> u32 {
    DEFAULT_UNREADY_AFTER_FAILURES
}

impl ExporterConfig {
    /// Load configuration from the docker environment, an optional config file
    /// and `SWARM_EXPORTER_*` variables, later sources winning
    pub fn load() -> Result<Self> {
        let builder = with_docker_env(config::Config::builder(), |var| {
            std::env::var(var).ok()
        })?
        .add_source(config::File::with_name("swarm-exporter").required(false))
        .add_source(config::Environment::with_prefix(ENV_PREFIX));

        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config = builder.build().context("Failed to read configuration")?;
        let config: Self = config
            .try_deserialize()
            .context("Invalid configuration")?;

        if config.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }
        if config.unready_after_failures == 0 {
            anyhow::bail!("unready_after_failures must be greater than zero");
        }

        Ok(config)
    }

    /// Socket address for the metrics server
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .listen_address
            .parse()
            .with_context(|| format!("Invalid listen address {}", self.listen_address))?;
        Ok(SocketAddr::new(ip, self.listen_port))
    }

    /// Settings for the Docker Engine API client
    pub fn docker_client_config(&self) -> DockerClientConfig {
        DockerClientConfig {
            host: self.docker_host.clone(),
            api_version: self.docker_api_version.clone(),
            cert_path: self.docker_cert_path.clone(),
            tls_verify: self.docker_tls_verify,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Seed defaults from the docker CLI variables; empty values count as unset
fn with_docker_env<F>(
    mut builder: ConfigBuilder<DefaultState>,
    lookup: F,
) -> Result<ConfigBuilder<DefaultState>>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |var: &str| lookup(var).filter(|v| !v.is_empty());

    for (var, key) in DOCKER_ENV_DEFAULTS {
        if let Some(value) = non_empty(var) {
            builder = builder.set_default(*key, value)?;
        }
    }
    // Like the docker CLI, any non-empty value enables verification
    if non_empty("DOCKER_TLS_VERIFY").is_some() {
        builder = builder.set_default("docker_tls_verify", true)?;
    }

    Ok(builder)
}
