//! Shared modules used by both the CLI and the daemon
//!
//! Currently the socket client for the name service.

pub mod ipc;

pub use ipc::{ClientConfig, NameServiceClient};
