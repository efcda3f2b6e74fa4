// LXD Control API Contract
//
// The remote calls the session is allowed to make. `LxdClient` implements
// this against a real LXD host; tests substitute a recording fake.

use async_trait::async_trait;
use serde_json::Value;

/// Timeout sentinel understood by LXD as "wait indefinitely"
pub const WAIT_FOREVER: i32 = -1;

/// Final operation status the session expects from every wait
pub const OPERATION_SUCCESS: u16 = 200;

/// Errors raised by the remote hypervisor API
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// LXD answered with an error response
    #[error("LXD API error ({code}): {message}")]
    Status { code: u16, message: String },

    /// The host could not be reached
    #[error("Failed to reach LXD at {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    /// A non-wait request exceeded the client-side request timeout
    #[error("LXD request {path} timed out after {secs}s")]
    Timeout { path: String, secs: u64 },

    /// The response body could not be understood
    #[error("Malformed LXD response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Shorthand for an error response carrying a code and message
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            message: message.into(),
        }
    }

    /// The remote status code, if LXD produced one
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether LXD reported the target as missing
    pub fn is_not_found(&self) -> bool {
        self.code() == Some(404)
    }
}

/// Raw `(status, payload)` pair returned by a remote call
#[derive(Debug, Clone, PartialEq)]
pub struct LxdResponse {
    /// HTTP status of the response
    pub status: u16,
    /// Decoded JSON body
    pub payload: Value,
}

impl LxdResponse {
    pub fn new(status: u16, payload: Value) -> Self {
        Self { status, payload }
    }

    /// Handle of the background operation started by this request
    pub fn operation(&self) -> Option<&str> {
        self.payload.get("operation").and_then(Value::as_str)
    }

    /// The `metadata` object of the response, if any
    pub fn metadata(&self) -> Option<&Value> {
        self.payload.get("metadata")
    }

    /// `metadata.status_code`, the state of the container or operation described
    pub fn metadata_status_code(&self) -> Option<u16> {
        self.metadata()
            .and_then(|m| m.get("status_code"))
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
    }
}

/// Remote hypervisor control API
///
/// Every method maps onto a single LXD request. Booleans and name lists are
/// returned decoded; everything else is passed back as a raw [`LxdResponse`].
#[async_trait]
pub trait LxdApi: Send + Sync {
    /// Names of all containers on the host
    async fn container_list(&self) -> Result<Vec<String>, ApiError>;

    async fn container_defined(&self, name: &str) -> Result<bool, ApiError>;

    async fn container_running(&self, name: &str) -> Result<bool, ApiError>;

    async fn container_state(&self, name: &str) -> Result<LxdResponse, ApiError>;

    /// Create a container from a full container definition
    async fn container_init(&self, config: &Value) -> Result<LxdResponse, ApiError>;

    /// Replace the definition of an existing container
    async fn container_update(&self, name: &str, config: &Value)
        -> Result<LxdResponse, ApiError>;

    async fn container_start(&self, name: &str, timeout: i32) -> Result<LxdResponse, ApiError>;

    async fn container_stop(&self, name: &str, timeout: i32) -> Result<LxdResponse, ApiError>;

    async fn container_reboot(&self, name: &str, timeout: i32) -> Result<LxdResponse, ApiError>;

    async fn container_freeze(&self, name: &str, timeout: i32) -> Result<LxdResponse, ApiError>;

    async fn container_unfreeze(&self, name: &str, timeout: i32)
        -> Result<LxdResponse, ApiError>;

    async fn container_destroy(&self, name: &str) -> Result<LxdResponse, ApiError>;

    /// Block until `operation` finishes, then report whether its final
    /// status code equals `status_code`. A `timeout` of [`WAIT_FOREVER`]
    /// never gives up.
    async fn wait_container_operation(
        &self,
        operation: &str,
        status_code: u16,
        timeout: i32,
    ) -> Result<bool, ApiError>;

    async fn operation_info(&self, operation: &str) -> Result<LxdResponse, ApiError>;

    async fn alias_defined(&self, alias: &str) -> Result<bool, ApiError>;

    async fn alias_create(&self, alias: &Value) -> Result<bool, ApiError>;

    async fn profile_list(&self) -> Result<Vec<String>, ApiError>;

    async fn profile_defined(&self, name: &str) -> Result<bool, ApiError>;

    async fn profile_create(&self, config: &Value) -> Result<LxdResponse, ApiError>;

    async fn profile_delete(&self, name: &str) -> Result<LxdResponse, ApiError>;
}
