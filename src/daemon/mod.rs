//! Name-service daemon
//!
//! This module provides:
//! - The service core task that owns the name registry
//! - The connection dispatcher and per-connection protocol handlers
//! - `NameServer`, which composes them over one mailbox broker
//! - Lifecycle support: detaching, PID file, signals

pub mod core;
pub mod dispatcher;
pub mod handler;
pub mod lifecycle;
pub mod server;

// Re-export commonly used types
pub use self::core::{ServiceCore, CORE_MAILBOX_KEY};
pub use dispatcher::ConnectionDispatcher;
pub use handler::{HandlerState, ProtocolHandler};
pub use lifecycle::{DaemonState, LifecycleError, PidFile};
pub use server::{NameServer, ShutdownHandle};
