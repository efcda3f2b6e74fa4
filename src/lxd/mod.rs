//! LXD Remote API
//!
//! Three layers:
//!
//! 1. **Contract** (`api`): the [`LxdApi`] trait the session talks to
//! 2. **Wire types** (`types`): the LXD response envelope and status codes
//! 3. **Client** (`client`): [`LxdClient`], the REST implementation over a
//!    unix socket or HTTPS

pub mod api;
pub mod client;
pub mod types;

#[cfg(test)]
pub mod fake;

pub use api::{ApiError, LxdApi, LxdResponse, OPERATION_SUCCESS, WAIT_FOREVER};
pub use client::{Endpoint, LxdClient, DEFAULT_SOCKET};
pub use types::{Envelope, OperationMetadata, ResponseType, StatusCode};
