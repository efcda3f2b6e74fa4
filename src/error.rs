//! Driver Error Types
//!
//! [`DriverError`] is the only error a session call returns. Remote failures
//! are carried as the `source` so callers can still inspect the LXD code.

use crate::lxd::ApiError;

/// Result type alias for session operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Generic compute driver failure
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// A remote LXD call failed
    #[error("Error from LXD during {operation} for {instance}: {source}")]
    Api {
        operation: &'static str,
        instance: String,
        #[source]
        source: ApiError,
    },

    /// A mutating call did not hand back an operation to wait on
    #[error("LXD returned no operation handle for {operation} on {instance}")]
    MissingOperation {
        operation: &'static str,
        instance: String,
    },

    /// A background operation finished in a state other than success
    #[error("Operation {operation_id} for {instance} did not finish with status {expected}")]
    OperationFailed {
        operation_id: String,
        instance: String,
        expected: u16,
    },

    /// Container creation finished but reported failure
    #[error("Failed to create container {instance}: {message}")]
    ContainerCreate { instance: String, message: String },

    /// Profile creation requested for a profile that is already defined
    #[error("Profile already exists for {0}")]
    ProfileExists(String),

    /// Session could not be set up
    #[error("Failed to connect to LXD: {0}")]
    Connect(#[source] ApiError),
}

impl DriverError {
    /// Wrap a remote failure raised while performing `operation`
    pub fn api(operation: &'static str, instance: impl Into<String>, source: ApiError) -> Self {
        Self::Api {
            operation,
            instance: instance.into(),
            source,
        }
    }

    /// The underlying remote error, if this failure came from LXD
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api { source, .. } | Self::Connect(source) => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_api_error_is_wrapped_as_source() {
        let err = DriverError::api("container_start", "instance-1", ApiError::status(500, "Fake"));

        assert!(err.to_string().contains("container_start"));
        assert!(err.to_string().contains("instance-1"));
        assert_eq!(err.api_error().and_then(ApiError::code), Some(500));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_non_remote_errors_have_no_api_error() {
        let err = DriverError::ProfileExists("instance-1".to_string());
        assert!(err.api_error().is_none());
        assert_eq!(err.to_string(), "Profile already exists for instance-1");
    }

    #[test]
    fn test_operation_failed_display() {
        let err = DriverError::OperationFailed {
            operation_id: "/1.0/operations/1".to_string(),
            instance: "instance-1".to_string(),
            expected: 200,
        };
        assert!(err.to_string().contains("/1.0/operations/1"));
        assert!(err.to_string().contains("200"));
    }
}
