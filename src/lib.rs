//! LXD Driver Library
//!
//! Compute-driver session for LXD hosts: container lifecycle, background
//! operation tracking, image aliases and profiles, all over the LXD REST API.
//!
//! The [`session::LxdSession`] is the entry point. It talks to the host through
//! the [`lxd::LxdApi`] contract, implemented by [`lxd::LxdClient`].

pub mod config;
pub mod error;
pub mod instance;
pub mod lxd;
pub mod metrics;
pub mod session;

pub use config::Config;
pub use error::{DriverError, DriverResult};
pub use instance::Instance;
pub use session::LxdSession;
