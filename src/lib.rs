//! mqnamed: name service for message-queue identifiers
//!
//! Processes register a human-readable name for a queue they own; others
//! look the name up to get the queue's identifier, or remove it. The daemon
//! serves a small text/binary protocol over TCP or Unix-domain sockets.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod errors;
pub mod mailbox;
pub mod protocol;
pub mod registry;
pub mod shared;
pub mod transport;

// Re-export commonly used types for convenience
pub use config::{Config, ConfigManager};
pub use daemon::{NameServer, ShutdownHandle};
pub use errors::{AppError, AppResult};
pub use mailbox::{MailboxBroker, QueueHandle};
pub use protocol::{Command, Reply, Status};
pub use shared::NameServiceClient;
pub use transport::ListenAddr;
