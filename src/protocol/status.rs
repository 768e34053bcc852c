//! Reply status strings
//!
//! Every reply is an ASCII status followed by the terminator. A successful
//! Find appends the 4-byte big-endian queue id after the terminator.

use std::fmt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::{CodecError, ID_LEN, MAX_TOKEN_LEN, TERMINATOR};
use crate::mailbox::QueueHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    OkAdd,
    PortExists,
    QueueNotExists,
    OkRemove,
    PortNotSubscribed,
    OkFind,
    /// Generic acknowledgement for anything that is not a known command
    MsgOk,
    /// Sent by a handler whose connection exceeded its deadline
    Timeout,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OkAdd => "OK_ADD_MSGQUEUE",
            Self::PortExists => "ERROR_PORT_EXISTS",
            Self::QueueNotExists => "ERROR_QUEUE_NOTEXISTS",
            Self::OkRemove => "OK_REMOVE_MSGQUEUE",
            Self::PortNotSubscribed => "ERROR_PORT_NOTSUBSCRIBED",
            Self::OkFind => "OK_FIND_MSGQUEUE",
            Self::MsgOk => "MSG_OK",
            Self::Timeout => "ERROR_TIMEOUT",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "OK_ADD_MSGQUEUE" => Self::OkAdd,
            "ERROR_PORT_EXISTS" => Self::PortExists,
            "ERROR_QUEUE_NOTEXISTS" => Self::QueueNotExists,
            "OK_REMOVE_MSGQUEUE" => Self::OkRemove,
            "ERROR_PORT_NOTSUBSCRIBED" => Self::PortNotSubscribed,
            "OK_FIND_MSGQUEUE" => Self::OkFind,
            "MSG_OK" => Self::MsgOk,
            "ERROR_TIMEOUT" => Self::Timeout,
            _ => return None,
        })
    }

    pub fn is_error(self) -> bool {
        self.as_str().starts_with("ERROR_")
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status plus, for a successful Find, the id that was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub handle: Option<QueueHandle>,
}

impl Reply {
    pub fn status(status: Status) -> Self {
        Self {
            status,
            handle: None,
        }
    }

    pub fn found(handle: QueueHandle) -> Self {
        Self {
            status: Status::OkFind,
            handle: Some(handle),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let text = self.status.as_str().as_bytes();
        let mut out = Vec::with_capacity(text.len() + 1 + ID_LEN);
        out.extend_from_slice(text);
        out.push(TERMINATOR);
        if let (Status::OkFind, Some(handle)) = (self.status, self.handle) {
            out.extend_from_slice(&handle.get().to_be_bytes());
        }
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let end = buf
            .iter()
            .position(|b| *b == TERMINATOR)
            .ok_or(CodecError::UnexpectedEof { expected: "status" })?;
        let status = parse_status(&buf[..end])?;
        let rest = &buf[end + 1..];

        if status != Status::OkFind {
            if !rest.is_empty() {
                return Err(CodecError::TrailingBytes(rest.len()));
            }
            return Ok(Self::status(status));
        }

        let id: [u8; ID_LEN] = rest
            .get(..ID_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or(CodecError::UnexpectedEof { expected: "queue id" })?;
        if rest.len() > ID_LEN {
            return Err(CodecError::TrailingBytes(rest.len() - ID_LEN));
        }
        Ok(Self::found(QueueHandle::new(u32::from_be_bytes(id))))
    }
}

fn parse_status(bytes: &[u8]) -> Result<Status, CodecError> {
    let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8 { field: "status" })?;
    Status::parse(text).ok_or_else(|| CodecError::UnknownStatus(text.to_string()))
}

/// Read one reply off a stream, as a client does
pub async fn read_reply<R>(reader: &mut R) -> Result<Reply, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let limit = (MAX_TOKEN_LEN + 1) as u64;
    let read = (&mut *reader).take(limit).read_until(TERMINATOR, &mut line).await?;
    if read == 0 || line.last() != Some(&TERMINATOR) {
        return Err(CodecError::UnexpectedEof { expected: "status" });
    }
    line.pop();

    let status = parse_status(&line)?;
    if status != Status::OkFind {
        return Ok(Reply::status(status));
    }

    let mut id = [0u8; ID_LEN];
    reader.read_exact(&mut id).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            CodecError::UnexpectedEof { expected: "queue id" }
        } else {
            CodecError::Io(e)
        }
    })?;
    Ok(Reply::found(QueueHandle::new(u32::from_be_bytes(id))))
}
