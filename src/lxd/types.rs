// LXD API Types
//
// This module contains the data structures exchanged with the LXD REST API.
// Every response from LXD is wrapped in the same envelope; async responses
// carry an operation handle that is later waited on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of LXD response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Request completed synchronously
    Sync,
    /// Request started a background operation
    Async,
    /// Request failed
    Error,
}

/// Standard LXD response envelope
///
/// Fields not relevant to a given response type are absent on the wire and
/// default here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: ResponseType,

    /// Human readable status ("Success", "Operation created")
    #[serde(default)]
    pub status: String,

    /// Numeric status, see [`StatusCode`]
    #[serde(default)]
    pub status_code: u16,

    /// Operation handle (async responses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,

    /// Error code (error responses only)
    #[serde(default)]
    pub error_code: u16,

    /// Error message (error responses only)
    #[serde(default)]
    pub error: String,

    #[serde(default)]
    pub metadata: Value,
}

impl Envelope {
    pub fn is_error(&self) -> bool {
        self.kind == ResponseType::Error
    }
}

/// LXD status codes for containers and operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StatusCode {
    OperationCreated = 100,
    Started = 101,
    Stopped = 102,
    Running = 103,
    Cancelling = 104,
    Pending = 105,
    Starting = 106,
    Stopping = 107,
    Aborting = 108,
    Freezing = 109,
    Frozen = 110,
    Thawed = 111,
    Success = 200,
    Failure = 400,
    Cancelled = 401,
}

impl StatusCode {
    pub fn from_code(code: u16) -> Option<Self> {
        let status = match code {
            100 => Self::OperationCreated,
            101 => Self::Started,
            102 => Self::Stopped,
            103 => Self::Running,
            104 => Self::Cancelling,
            105 => Self::Pending,
            106 => Self::Starting,
            107 => Self::Stopping,
            108 => Self::Aborting,
            109 => Self::Freezing,
            110 => Self::Frozen,
            111 => Self::Thawed,
            200 => Self::Success,
            400 => Self::Failure,
            401 => Self::Cancelled,
            _ => return None,
        };
        Some(status)
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    /// Whether an operation in this state has finished
    pub fn is_final(self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Cancelled)
    }
}

/// Body of a container state change request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    /// "start", "stop", "restart", "freeze" or "unfreeze"
    pub action: String,
    /// Seconds LXD waits for the change, -1 for no limit
    pub timeout: i32,
    pub force: bool,
}

impl StateChange {
    pub fn new(action: &str, timeout: i32) -> Self {
        Self {
            action: action.to_string(),
            timeout,
            force: false,
        }
    }
}

/// Metadata of a background operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetadata {
    #[serde(default)]
    pub id: String,

    /// "task", "websocket" or "token"
    #[serde(default)]
    pub class: String,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub status: String,

    pub status_code: u16,

    #[serde(default)]
    pub may_cancel: bool,

    /// Failure reason when the operation did not succeed
    #[serde(default)]
    pub err: String,
}

impl OperationMetadata {
    pub fn state(&self) -> Option<StatusCode> {
        StatusCode::from_code(self.status_code)
    }

    /// Wall time between creation and last update, when both are known
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        match (self.created_at, self.updated_at) {
            (Some(created), Some(updated)) => Some(updated - created),
            _ => None,
        }
    }
}

/// Strip the API prefix from a resource URL (`/1.0/containers/c1` -> `c1`)
pub fn resource_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}
