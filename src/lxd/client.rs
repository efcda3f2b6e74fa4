// LXD REST Client
//
// Speaks the LXD 1.0 REST API, either over the local unix socket (hyper
// client connection on a UnixStream) or to a remote HTTPS endpoint (reqwest).
// Wait requests never carry a client-side timeout; LXD itself enforces the
// timeout passed in the query string.

use crate::config::LxdConfig;
use crate::lxd::api::{ApiError, LxdApi, LxdResponse};
use crate::lxd::types::{resource_name, Envelope, StateChange, StatusCode};
use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::Method;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

#[cfg(unix)]
use http_body_util::{BodyExt, Full}; // BodyExt for collect()
#[cfg(unix)]
use hyper::client::conn::http1::{Connection, SendRequest};
#[cfg(unix)]
use hyper::Request;
#[cfg(unix)]
use hyper_util::rt::TokioIo;
#[cfg(unix)]
use std::path::Path;
#[cfg(unix)]
use tokio::net::UnixStream;

// Type aliases for cleaner signatures
#[cfg(unix)]
type HttpSendRequest = SendRequest<Full<Bytes>>;
#[cfg(unix)]
type HttpConnection = Connection<TokioIo<UnixStream>, Full<Bytes>>;

/// Default location of the LXD daemon socket
pub const DEFAULT_SOCKET: &str = "/var/lib/lxd/unix.socket";

/// Where the LXD daemon listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Local daemon socket
    Unix(PathBuf),
    /// Remote daemon base URL (`https://host:8443`)
    Remote(String),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Client for one LXD host
pub struct LxdClient {
    endpoint: Endpoint,
    /// Only built for remote endpoints
    http: Option<reqwest::Client>,
    request_timeout: Duration,
}

impl LxdClient {
    /// Client for the daemon listening on a local unix socket
    pub fn unix(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: Endpoint::Unix(socket_path.into()),
            http: None,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Client for a remote daemon reachable over HTTPS
    ///
    /// With `verify_tls` off, self-signed host certificates are accepted.
    pub fn remote(url: impl Into<String>, verify_tls: bool) -> Result<Self, ApiError> {
        let url = url.into();
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|e| ApiError::Connection {
                endpoint: url.clone(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            endpoint: Endpoint::Remote(url.trim_end_matches('/').to_string()),
            http: Some(http),
            request_timeout: Duration::from_secs(30),
        })
    }

    /// Build the client described by the `[lxd]` configuration section
    pub fn from_config(config: &LxdConfig) -> Result<Self, ApiError> {
        let client = match &config.remote_url {
            Some(url) => Self::remote(url.clone(), config.verify_tls)?,
            None => Self::unix(&config.socket_path),
        };
        Ok(client.with_request_timeout(Duration::from_secs(config.request_timeout_secs)))
    }

    /// Set the client-side timeout for non-wait requests
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    async fn get(&self, path: &str) -> Result<LxdResponse, ApiError> {
        self.request(Method::GET, path, None, false).await
    }

    /// Issue one request and decode the LXD envelope
    ///
    /// `wait` requests are exempt from the client-side request timeout.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        wait: bool,
    ) -> Result<LxdResponse, ApiError> {
        debug!("LXD request: {} {} via {}", method, path, self.endpoint);

        let exchange = self.send(method.clone(), path, body);
        let (status, bytes) = if wait {
            exchange.await?
        } else {
            tokio::time::timeout(self.request_timeout, exchange)
                .await
                .map_err(|_| ApiError::Timeout {
                    path: path.to_string(),
                    secs: self.request_timeout.as_secs(),
                })??
        };

        let payload = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| {
                ApiError::Malformed(format!("{} {} returned invalid JSON: {}", method, path, e))
            })?
        };

        debug!("LXD response: {} {} -> {}", method, path, status);
        decode_response(status, payload)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(u16, Bytes), ApiError> {
        match &self.endpoint {
            #[cfg(unix)]
            Endpoint::Unix(socket) => send_unix(socket, method, path, body).await,
            #[cfg(not(unix))]
            Endpoint::Unix(socket) => Err(ApiError::Connection {
                endpoint: socket.display().to_string(),
                message: "unix sockets are only supported on Unix systems".to_string(),
            }),
            Endpoint::Remote(url) => self.send_remote(url, method, path, body).await,
        }
    }

    async fn send_remote(
        &self,
        url: &str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(u16, Bytes), ApiError> {
        let connection_error = |message: String| ApiError::Connection {
            endpoint: url.to_string(),
            message,
        };
        let http = self
            .http
            .as_ref()
            .ok_or_else(|| connection_error("HTTP client not initialized".to_string()))?;
        let method = reqwest::Method::from_bytes(method.as_str().as_bytes())
            .map_err(|e| ApiError::Malformed(format!("invalid method: {}", e)))?;

        let mut request = http
            .request(method, format!("{}{}", url, path))
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| connection_error(e.to_string()))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| connection_error(format!("failed to read response body: {}", e)))?;

        Ok((status, bytes))
    }

    /// `true` for 200, `false` for 404, error otherwise
    async fn exists(&self, path: &str) -> Result<bool, ApiError> {
        match self.get(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn change_state(
        &self,
        name: &str,
        action: &str,
        timeout: i32,
    ) -> Result<LxdResponse, ApiError> {
        let body = serde_json::to_value(StateChange::new(action, timeout))
            .map_err(|e| ApiError::Malformed(e.to_string()))?;
        self.request(
            Method::PUT,
            &format!("{}/state", resource_path("/1.0/containers", name)),
            Some(&body),
            false,
        )
        .await
    }
}

#[cfg(unix)]
async fn send_unix(
    socket_path: &Path,
    method: Method,
    path: &str,
    body: Option<&Value>,
) -> Result<(u16, Bytes), ApiError> {
    let endpoint = socket_path.display().to_string();
    let connection_error = |message: String| ApiError::Connection {
        endpoint: endpoint.clone(),
        message,
    };

    let stream: UnixStream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| connection_error(e.to_string()))?;
    let io = TokioIo::new(stream);
    let (mut sender, conn): (HttpSendRequest, HttpConnection) =
        hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| connection_error(format!("handshake failed: {}", e)))?;

    tokio::task::spawn(async move {
        if let Err(err) = conn.await {
            debug!("LXD connection closed: {:?}", err);
        }
    });

    let req_body = match body {
        Some(b) => {
            let json = serde_json::to_vec(b)
                .map_err(|e| ApiError::Malformed(format!("failed to serialize body: {}", e)))?;
            Full::new(Bytes::from(json))
        }
        None => Full::new(Bytes::new()),
    };

    let req = Request::builder()
        .method(method)
        .uri(path)
        .header("Host", "lxd")
        .header("Content-Type", "application/json")
        .header("Accept", "application/json")
        .body(req_body)
        .map_err(|e| ApiError::Malformed(format!("failed to build request: {}", e)))?;

    let res = sender
        .send_request(req)
        .await
        .map_err(|e| connection_error(format!("failed to send request: {}", e)))?;

    let status = res.status().as_u16();
    let bytes = res
        .into_body()
        .collect()
        .await
        .map_err(|e| connection_error(format!("failed to read response body: {}", e)))?
        .to_bytes();

    Ok((status, bytes))
}

/// Turn an HTTP status and body into a response or an [`ApiError`]
fn decode_response(status: u16, payload: Value) -> Result<LxdResponse, ApiError> {
    let error_envelope = payload.get("type").and_then(Value::as_str) == Some("error");
    if status < 400 && !error_envelope {
        return Ok(LxdResponse::new(status, payload));
    }

    match serde_json::from_value::<Envelope>(payload.clone()) {
        Ok(envelope) if envelope.is_error() => {
            let code = if envelope.error_code != 0 {
                envelope.error_code
            } else {
                status
            };
            Err(ApiError::status(code, envelope.error))
        }
        _ => Err(ApiError::status(status, payload.to_string())),
    }
}

/// Path of one named resource; the name is always a single encoded segment
fn resource_path(collection: &str, name: &str) -> String {
    format!("{}/{}", collection, urlencoding::encode(name))
}

/// Names from a list response (`metadata` holds resource URLs)
fn resource_names(response: &LxdResponse) -> Result<Vec<String>, ApiError> {
    match response.metadata() {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|url| {
                urlencoding::decode(resource_name(url))
                    .map(|name| name.into_owned())
                    .map_err(|e| {
                        ApiError::Malformed(format!("invalid resource URL {}: {}", url, e))
                    })
            })
            .collect(),
        Some(other) => Err(ApiError::Malformed(format!(
            "expected a list of resource URLs, got {}",
            other
        ))),
    }
}

#[async_trait]
impl LxdApi for LxdClient {
    async fn container_list(&self) -> Result<Vec<String>, ApiError> {
        resource_names(&self.get("/1.0/containers").await?)
    }

    async fn container_defined(&self, name: &str) -> Result<bool, ApiError> {
        self.exists(&resource_path("/1.0/containers", name)).await
    }

    async fn container_running(&self, name: &str) -> Result<bool, ApiError> {
        let state = self.container_state(name).await?;
        let status = state.metadata_status_code().and_then(StatusCode::from_code);
        Ok(status == Some(StatusCode::Running))
    }

    async fn container_state(&self, name: &str) -> Result<LxdResponse, ApiError> {
        let path = format!("{}/state", resource_path("/1.0/containers", name));
        self.get(&path).await
    }

    async fn container_init(&self, config: &Value) -> Result<LxdResponse, ApiError> {
        self.request(Method::POST, "/1.0/containers", Some(config), false)
            .await
    }

    async fn container_update(
        &self,
        name: &str,
        config: &Value,
    ) -> Result<LxdResponse, ApiError> {
        self.request(
            Method::PUT,
            &resource_path("/1.0/containers", name),
            Some(config),
            false,
        )
        .await
    }

    async fn container_start(&self, name: &str, timeout: i32) -> Result<LxdResponse, ApiError> {
        self.change_state(name, "start", timeout).await
    }

    async fn container_stop(&self, name: &str, timeout: i32) -> Result<LxdResponse, ApiError> {
        self.change_state(name, "stop", timeout).await
    }

    async fn container_reboot(&self, name: &str, timeout: i32) -> Result<LxdResponse, ApiError> {
        self.change_state(name, "restart", timeout).await
    }

    async fn container_freeze(&self, name: &str, timeout: i32) -> Result<LxdResponse, ApiError> {
        self.change_state(name, "freeze", timeout).await
    }

    async fn container_unfreeze(
        &self,
        name: &str,
        timeout: i32,
    ) -> Result<LxdResponse, ApiError> {
        self.change_state(name, "unfreeze", timeout).await
    }

    async fn container_destroy(&self, name: &str) -> Result<LxdResponse, ApiError> {
        self.request(
            Method::DELETE,
            &resource_path("/1.0/containers", name),
            None,
            false,
        )
        .await
    }

    async fn wait_container_operation(
        &self,
        operation: &str,
        status_code: u16,
        timeout: i32,
    ) -> Result<bool, ApiError> {
        let path = format!("{}/wait?timeout={}", operation, timeout);
        let response = self.request(Method::GET, &path, None, true).await?;
        let final_status = response.metadata_status_code().ok_or_else(|| {
            ApiError::Malformed(format!("wait on {} returned no status_code", operation))
        })?;
        Ok(final_status == status_code)
    }

    async fn operation_info(&self, operation: &str) -> Result<LxdResponse, ApiError> {
        self.get(operation).await
    }

    async fn alias_defined(&self, alias: &str) -> Result<bool, ApiError> {
        self.exists(&resource_path("/1.0/images/aliases", alias)).await
    }

    async fn alias_create(&self, alias: &Value) -> Result<bool, ApiError> {
        let response = self
            .request(Method::POST, "/1.0/images/aliases", Some(alias), false)
            .await?;
        Ok(response.status == 200 || response.status == 201)
    }

    async fn profile_list(&self) -> Result<Vec<String>, ApiError> {
        resource_names(&self.get("/1.0/profiles").await?)
    }

    async fn profile_defined(&self, name: &str) -> Result<bool, ApiError> {
        self.exists(&resource_path("/1.0/profiles", name)).await
    }

    async fn profile_create(&self, config: &Value) -> Result<LxdResponse, ApiError> {
        self.request(Method::POST, "/1.0/profiles", Some(config), false)
            .await
    }

    async fn profile_delete(&self, name: &str) -> Result<LxdResponse, ApiError> {
        self.request(
            Method::DELETE,
            &resource_path("/1.0/profiles", name),
            None,
            false,
        )
        .await
    }
}
