//! Mailboxes: bounded FIFOs of tagged byte messages
//!
//! This module provides:
//! - `MailboxBroker`, the table of live mailboxes addressed by `QueueHandle`
//! - `Mailbox`, an owning or borrowed view of one queue with send/receive
//! - `QueueProbe`, the liveness check the name registry uses for handles,
//!   implemented by the broker and by the kernel's System V queues

pub mod broker;
pub mod sysv;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use broker::{Mailbox, MailboxBroker};
pub use sysv::SysvQueues;

/// Default per-message payload limit in bytes
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4096;

/// Default number of messages a mailbox holds before senders wait
pub const DEFAULT_MAX_MESSAGES: usize = 64;

/// Tag carried by requests sent to the service core
pub const REQUEST_TAG: i64 = 1;

/// Tag carried by replies sent back to a handler
pub const REPLY_TAG: i64 = 2;

/// Selector that matches any message
pub const ANY_TAG: i64 = 0;

/// Opaque identifier naming a mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueueHandle(u32);

impl QueueHandle {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for QueueHandle {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// A byte payload plus a numeric tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub tag: i64,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(tag: i64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }
}

/// How a mailbox is looked up when it is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxKey {
    /// Always create a fresh, anonymous mailbox
    Private,
    /// Create the mailbox for this key, or open it if it already exists
    Named(u32),
}

/// Size limits applied to every mailbox of a broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxLimits {
    pub max_message_size: usize,
    pub max_messages: usize,
}

impl Default for MailboxLimits {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }
}

/// Mailbox operation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailboxError {
    #[error("mailbox {0} does not exist")]
    Unknown(QueueHandle),

    #[error("mailbox {0} was removed")]
    Removed(QueueHandle),

    #[error("mailbox {handle} is full ({capacity} messages)")]
    Full { handle: QueueHandle, capacity: usize },

    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    #[error("message of {size} bytes does not fit the {max_len} byte receive buffer")]
    MessageTooLong { size: usize, max_len: usize },

    #[error("message tag must be positive, got {0}")]
    InvalidTag(i64),

    #[error("no mailbox handles left")]
    Exhausted,
}

/// Liveness check for queue handles presented by clients
pub trait QueueProbe: Send + Sync {
    /// Whether `handle` currently names a live queue
    fn is_live(&self, handle: QueueHandle) -> bool;
}

impl<T: QueueProbe + ?Sized> QueueProbe for std::sync::Arc<T> {
    fn is_live(&self, handle: QueueHandle) -> bool {
        (**self).is_live(handle)
    }
}

impl<T: QueueProbe + ?Sized> QueueProbe for Box<T> {
    fn is_live(&self, handle: QueueHandle) -> bool {
        (**self).is_live(handle)
    }
}

/// Which probe validates handles on Add
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// Kernel System V message queues owned by client processes
    #[default]
    Sysv,
    /// Mailboxes of the daemon's own broker
    Local,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_defaults() {
        let limits = MailboxLimits::default();
        assert_eq!(limits.max_message_size, 4096);
        assert_eq!(limits.max_messages, 64);
    }

    #[test]
    fn test_probe_kind_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            probe: ProbeKind,
        }

        let local: Wrapper = toml::from_str("probe = \"local\"").unwrap();
        assert_eq!(local.probe, ProbeKind::Local);
        let sysv: Wrapper = toml::from_str("probe = \"sysv\"").unwrap();
        assert_eq!(sysv.probe, ProbeKind::Sysv);
        assert!(toml::from_str::<Wrapper>("probe = \"posix\"").is_err());
    }

    #[test]
    fn test_handle_display() {
        assert_eq!(QueueHandle::new(42).to_string(), "42");
        assert_eq!(QueueHandle::from(7).get(), 7);
    }
}
