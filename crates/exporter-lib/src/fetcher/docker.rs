//! Docker Engine API client
//!
//! Reads services and tasks from a swarm manager. Supports the same host
//! conventions as the docker CLI: `unix://` sockets, `tcp://` hosts (HTTPS
//! when TLS is enabled) and plain `http(s)://` URLs, plus an optional
//! client certificate directory holding `ca.pem`, `cert.pem` and `key.pem`.

use super::api_types::{ServiceResource, TaskResource};
use super::{async_trait, ClusterStateFetcher, FetchError};
use crate::models::{Service, Task};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default socket of a local docker daemon
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// Where the docker daemon listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerEndpoint {
    /// Local unix domain socket
    Unix(PathBuf),
    /// HTTP or HTTPS base URL
    Http(Url),
}

impl DockerEndpoint {
    /// Parse a docker host string such as `unix:///var/run/docker.sock` or `tcp://10.0.0.1:2376`
    pub fn parse(host: &str, tls: bool) -> Result<Self, FetchError> {
        let invalid = |reason: &str| FetchError::InvalidEndpoint {
            endpoint: host.to_string(),
            reason: reason.to_string(),
        };

        if let Some(path) = host.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(invalid("missing socket path"));
            }
            return Ok(DockerEndpoint::Unix(PathBuf::from(path)));
        }

        let url = if let Some(addr) = host.strip_prefix("tcp://") {
            let scheme = if tls { "https" } else { "http" };
            format!("{}://{}", scheme, addr)
        } else if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            return Err(invalid(
                "unsupported scheme, expected unix://, tcp://, http:// or https://",
            ));
        };

        let url = Url::parse(&url).map_err(|e| invalid(&e.to_string()))?;
        if url.host_str().is_none() {
            return Err(invalid("missing host"));
        }

        Ok(DockerEndpoint::Http(url))
    }
}

impl fmt::Display for DockerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DockerEndpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            DockerEndpoint::Http(url) => write!(f, "{}", url),
        }
    }
}

/// Configuration for the docker client
#[derive(Debug, Clone)]
pub struct DockerClientConfig {
    /// Docker host, in `DOCKER_HOST` syntax
    pub host: String,
    /// API version to pin requests to (e.g. "1.43"); the daemon default when unset
    pub api_version: Option<String>,
    /// Directory with `ca.pem`, `cert.pem` and `key.pem`
    pub cert_path: Option<PathBuf>,
    /// Verify the daemon certificate against `ca.pem`
    pub tls_verify: bool,
    /// Timeout for a single API request
    pub request_timeout: Duration,
}

impl Default for DockerClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DOCKER_HOST.to_string(),
            api_version: None,
            cert_path: None,
            tls_verify: false,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Docker Engine API client implementing [`ClusterStateFetcher`]
#[derive(Debug, Clone)]
pub struct DockerClient {
    endpoint: DockerEndpoint,
    http: reqwest::Client,
    api_version: Option<String>,
    request_timeout: Duration,
}

impl DockerClient {
    /// Create a client from configuration
    pub fn new(config: DockerClientConfig) -> Result<Self, FetchError> {
        let tls = config.tls_verify || config.cert_path.is_some();
        let endpoint = DockerEndpoint::parse(&config.host, tls)?;

        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);

        if let Some(dir) = &config.cert_path {
            let ca = reqwest::Certificate::from_pem(&read_pem(dir, "ca.pem")?)
                .map_err(|e| FetchError::Tls(e.to_string()))?;

            let mut identity_pem = read_pem(dir, "cert.pem")?;
            identity_pem.extend_from_slice(&read_pem(dir, "key.pem")?);
            let identity = reqwest::Identity::from_pem(&identity_pem)
                .map_err(|e| FetchError::Tls(e.to_string()))?;

            builder = builder.add_root_certificate(ca).identity(identity);
            if !config.tls_verify {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        let http = builder
            .build()
            .map_err(|e| FetchError::Tls(e.to_string()))?;

        Ok(Self {
            endpoint,
            http,
            api_version: config
                .api_version
                .map(|v| v.trim_start_matches('v').to_string())
                .filter(|v| !v.is_empty()),
            request_timeout: config.request_timeout,
        })
    }

    /// The endpoint this client talks to
    pub fn endpoint(&self) -> &DockerEndpoint {
        &self.endpoint
    }

    fn resource_path(&self, resource: &str) -> String {
        match &self.api_version {
            Some(version) => format!("/v{}/{}", version, resource),
            None => format!("/{}", resource),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, resource: &str) -> Result<T, FetchError> {
        let path = self.resource_path(resource);

        let (status, body) = match &self.endpoint {
            DockerEndpoint::Unix(socket) => self.get_unix(socket, &path).await?,
            DockerEndpoint::Http(base) => self.get_http(base, &path).await?,
        };

        if !(200..300).contains(&status) {
            return Err(api_error(status, &body));
        }

        debug!(path = %path, bytes = body.len(), "Docker API response received");
        Ok(serde_json::from_slice(&body)?)
    }

    /// Fetch a JSON array, dropping elements that fail to decode
    async fn get_list<T: DeserializeOwned>(&self, resource: &str) -> Result<Vec<T>, FetchError> {
        let records: Vec<Value> = self.get_json(resource).await?;
        Ok(decode_records(resource, records))
    }

    async fn get_http(&self, base: &Url, path: &str) -> Result<(u16, Bytes), FetchError> {
        let url = base.join(path).map_err(|e| FetchError::InvalidEndpoint {
            endpoint: base.to_string(),
            reason: e.to_string(),
        })?;

        let response = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(path.to_string())
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok((status, body))
    }

    #[cfg(unix)]
    async fn get_unix(&self, socket: &Path, path: &str) -> Result<(u16, Bytes), FetchError> {
        use http_body_util::{BodyExt, Empty};
        use hyper_util::rt::TokioIo;

        let request = async {
            let stream = tokio::net::UnixStream::connect(socket)
                .await
                .map_err(|e| FetchError::Transport(format!("{}: {}", socket.display(), e)))?;

            let io = TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;

            // Drive the connection in the background
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    debug!(error = %e, "Docker socket connection closed with error");
                }
            });

            let req = hyper::Request::builder()
                .method(hyper::Method::GET)
                .uri(path)
                .header(hyper::header::HOST, "docker")
                .body(Empty::<Bytes>::new())
                .map_err(|e| FetchError::Transport(e.to_string()))?;

            let response = sender
                .send_request(req)
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;

            let status = response.status().as_u16();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?
                .to_bytes();

            Ok::<_, FetchError>((status, body))
        };

        tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| FetchError::Timeout(path.to_string()))?
    }

    #[cfg(not(unix))]
    async fn get_unix(&self, socket: &Path, _path: &str) -> Result<(u16, Bytes), FetchError> {
        Err(FetchError::InvalidEndpoint {
            endpoint: socket.display().to_string(),
            reason: "unix sockets are not supported on this platform".to_string(),
        })
    }
}

#[async_trait]
impl ClusterStateFetcher for DockerClient {
    async fn list_services(&self) -> Result<Vec<Service>, FetchError> {
        let resources: Vec<ServiceResource> = self.get_list("services").await?;
        Ok(resources.into_iter().map(Service::from).collect())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, FetchError> {
        let resources: Vec<TaskResource> = self.get_list("tasks").await?;
        Ok(resources.into_iter().map(Task::from).collect())
    }
}

/// Decode each record on its own, skipping the ones that do not fit
fn decode_records<T: DeserializeOwned>(resource: &str, records: Vec<Value>) -> Vec<T> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value(record) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(
                    resource = %resource,
                    index = index,
                    error = %e,
                    "Skipping malformed docker record"
                );
                None
            }
        })
        .collect()
}

fn read_pem(dir: &Path, file: &str) -> Result<Vec<u8>, FetchError> {
    let path = dir.join(file);
    std::fs::read(&path).map_err(|e| FetchError::Tls(format!("{}: {}", path.display(), e)))
}

fn api_error(status: u16, body: &[u8]) -> FetchError {
    let message = serde_json::from_slice::<ErrorResponse>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());

    FetchError::Api { status, message }
}
