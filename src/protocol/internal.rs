//! Internal handler→core mailbox format
//!
//! ```text
//! [u32 BE reply handle][u16 BE code][u16 BE len][name][u16 BE len][id]?
//! ```
//!
//! The id section is present only for Add. Codes outside {1, 2, 5}, or a
//! payload holding nothing but the reply handle, decode as
//! `RequestBody::Unrecognized` so the core can still acknowledge them.

use super::{name_from_bytes, CodecError, Command, CommandKind, ID_LEN};
use crate::mailbox::QueueHandle;

const HANDLE_LEN: usize = 4;
const CODE_LEN: usize = 2;
const SIZE_LEN: usize = 2;

/// A decoded mailbox request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub reply_to: QueueHandle,
    pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Command(Command),
    /// Anything that is not one of the known commands
    Unrecognized { code: Option<u16> },
}

/// Encode a command for the core, with the handle replies should go to
pub fn encode_request(reply_to: QueueHandle, command: &Command) -> Vec<u8> {
    let name = command.name().as_bytes();
    let mut out =
        Vec::with_capacity(HANDLE_LEN + CODE_LEN + SIZE_LEN + name.len() + SIZE_LEN + ID_LEN);

    out.extend_from_slice(&reply_to.get().to_be_bytes());
    out.extend_from_slice(&command.kind().code().to_be_bytes());
    // Names are bounded by MAX_TOKEN_LEN, far below u16::MAX.
    out.extend_from_slice(&(name.len() as u16).to_be_bytes());
    out.extend_from_slice(name);
    if let Command::Add { handle, .. } = command {
        out.extend_from_slice(&(ID_LEN as u16).to_be_bytes());
        out.extend_from_slice(&handle.get().to_be_bytes());
    }
    out
}

/// Read the reply handle alone, for payloads that fail to decode
pub fn peek_reply_to(buf: &[u8]) -> Option<QueueHandle> {
    let bytes: [u8; HANDLE_LEN] = buf.get(..HANDLE_LEN)?.try_into().ok()?;
    Some(QueueHandle::new(u32::from_be_bytes(bytes)))
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let available = self.buf.len() - self.pos;
        if available < len {
            return Err(CodecError::Truncated {
                needed: len,
                available,
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn sized(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u16()? as usize;
        self.take(len)
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

/// Decode a request received on the core mailbox
pub fn decode_request(buf: &[u8]) -> Result<Request, CodecError> {
    let mut reader = Reader { buf, pos: 0 };
    let reply_to = QueueHandle::new(reader.u32()?);

    if reader.remaining() < CODE_LEN {
        return Ok(Request {
            reply_to,
            body: RequestBody::Unrecognized { code: None },
        });
    }

    let code = reader.u16()?;
    let Some(kind) = CommandKind::from_code(code) else {
        return Ok(Request {
            reply_to,
            body: RequestBody::Unrecognized { code: Some(code) },
        });
    };

    let name = name_from_bytes(reader.sized()?.to_vec())?;
    let command = match kind {
        CommandKind::Add => {
            let id = reader.sized()?;
            if id.len() != ID_LEN {
                return Err(CodecError::BadIdLength(id.len()));
            }
            let raw = u32::from_be_bytes([id[0], id[1], id[2], id[3]]);
            Command::Add {
                name,
                handle: QueueHandle::new(raw),
            }
        }
        CommandKind::Remove => Command::Remove { name },
        CommandKind::Find => Command::Find { name },
    };

    if reader.remaining() > 0 {
        return Err(CodecError::TrailingBytes(reader.remaining()));
    }

    Ok(Request {
        reply_to,
        body: RequestBody::Command(command),
    })
}
