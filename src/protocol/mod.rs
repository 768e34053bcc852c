//! Wire protocol codec
//!
//! Two formats travel through the daemon:
//! - the client-facing socket format (`client`): text command tokens, a text
//!   name, and for Add a 4-byte big-endian queue id
//! - the internal mailbox format (`internal`): a compact binary request
//!   prefixed with the handler's reply mailbox handle
//!
//! Replies (`status`) are ASCII status strings, optionally followed by a
//! binary id. Everything here is pure; no sockets or mailboxes are needed to
//! encode or decode.

pub mod client;
pub mod internal;
pub mod status;

use thiserror::Error;

use crate::mailbox::QueueHandle;

pub use client::{decode_command, encode_command, read_command};
pub use internal::{decode_request, encode_request, Request, RequestBody};
pub use status::{read_reply, Reply, Status};

/// Byte that ends every text token on the socket
pub const TERMINATOR: u8 = b'\n';

/// Longest accepted text token, terminator excluded
pub const MAX_TOKEN_LEN: usize = 256;

/// Width of the binary queue id field
pub const ID_LEN: usize = 4;

/// Reserved internal command code, never produced
pub const RESERVED_OPEN_CODE: u16 = 3;

/// Reserved internal command code, never produced
pub const RESERVED_CLOSE_CODE: u16 = 4;

/// Codec failures; on the socket side these are protocol errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("empty name")]
    EmptyName,

    #[error("token longer than {limit} bytes")]
    TokenTooLong { limit: usize },

    #[error("stream ended while reading {expected}")]
    UnexpectedEof { expected: &'static str },

    #[error("message truncated: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },

    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("id field of {0} bytes, expected 4")]
    BadIdLength(usize),

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),

    #[error("unknown status '{0}'")]
    UnknownStatus(String),

    #[error("I/O error while decoding")]
    Io(#[from] std::io::Error),
}

/// The three operations a client can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Add,
    Remove,
    Find,
}

impl CommandKind {
    /// Socket token for this command
    pub fn token(self) -> &'static str {
        match self {
            Self::Add => "CMD_ADD_MSGQUEUE",
            Self::Remove => "CMD_REMOVE_MSGQUEUE",
            Self::Find => "CMD_FIND_MSGQUEUE",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "CMD_ADD_MSGQUEUE" => Some(Self::Add),
            "CMD_REMOVE_MSGQUEUE" => Some(Self::Remove),
            "CMD_FIND_MSGQUEUE" => Some(Self::Find),
            _ => None,
        }
    }

    /// Internal command code; 3 and 4 stay reserved
    pub fn code(self) -> u16 {
        match self {
            Self::Add => 1,
            Self::Remove => 2,
            Self::Find => 5,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::Add),
            2 => Some(Self::Remove),
            5 => Some(Self::Find),
            _ => None,
        }
    }
}

/// A decoded client request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add { name: String, handle: QueueHandle },
    Remove { name: String },
    Find { name: String },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Add { .. } => CommandKind::Add,
            Self::Remove { .. } => CommandKind::Remove,
            Self::Find { .. } => CommandKind::Find,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Add { name, .. } | Self::Remove { name } | Self::Find { name } => name,
        }
    }
}

/// Validate a name read off the wire
fn name_from_bytes(bytes: Vec<u8>) -> Result<String, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::EmptyName);
    }
    if bytes.len() > MAX_TOKEN_LEN {
        return Err(CodecError::TokenTooLong {
            limit: MAX_TOKEN_LEN,
        });
    }
    String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8 { field: "name" })
}
