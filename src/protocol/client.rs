//! Client-facing socket format
//!
//! ```text
//! CMD_ADD_MSGQUEUE\n printer1\n [u32 BE id]
//! CMD_REMOVE_MSGQUEUE\n printer1\n
//! CMD_FIND_MSGQUEUE\n printer1\n
//! ```

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use super::{name_from_bytes, CodecError, Command, CommandKind, ID_LEN, MAX_TOKEN_LEN, TERMINATOR};
use crate::mailbox::QueueHandle;

/// Encode a command as a client would write it
pub fn encode_command(command: &Command) -> Vec<u8> {
    let token = command.kind().token();
    let name = command.name();
    let mut out = Vec::with_capacity(token.len() + name.len() + 2 + ID_LEN);

    out.extend_from_slice(token.as_bytes());
    out.push(TERMINATOR);
    out.extend_from_slice(name.as_bytes());
    out.push(TERMINATOR);
    if let Command::Add { handle, .. } = command {
        out.extend_from_slice(&handle.get().to_be_bytes());
    }
    out
}

fn split_token<'a>(input: &mut &'a [u8], expected: &'static str) -> Result<&'a [u8], CodecError> {
    let search = &input[..input.len().min(MAX_TOKEN_LEN + 1)];
    match search.iter().position(|b| *b == TERMINATOR) {
        Some(end) => {
            let token = &input[..end];
            *input = &input[end + 1..];
            Ok(token)
        }
        None if input.len() > MAX_TOKEN_LEN => Err(CodecError::TokenTooLong {
            limit: MAX_TOKEN_LEN,
        }),
        None => Err(CodecError::UnexpectedEof { expected }),
    }
}

fn parse_kind(token: &[u8]) -> Result<CommandKind, CodecError> {
    let text = std::str::from_utf8(token).map_err(|_| CodecError::InvalidUtf8 { field: "command" })?;
    CommandKind::from_token(text).ok_or_else(|| CodecError::UnknownCommand(text.to_string()))
}

/// Decode one complete command from a buffer
pub fn decode_command(buf: &[u8]) -> Result<Command, CodecError> {
    let mut rest = buf;
    let kind = parse_kind(split_token(&mut rest, "command")?)?;
    let name = name_from_bytes(split_token(&mut rest, "name")?.to_vec())?;

    let command = match kind {
        CommandKind::Add => {
            if rest.len() < ID_LEN {
                return Err(CodecError::UnexpectedEof { expected: "queue id" });
            }
            let (id, tail) = rest.split_at(ID_LEN);
            rest = tail;
            let raw = u32::from_be_bytes([id[0], id[1], id[2], id[3]]);
            Command::Add {
                name,
                handle: QueueHandle::new(raw),
            }
        }
        CommandKind::Remove => Command::Remove { name },
        CommandKind::Find => Command::Find { name },
    };

    if !rest.is_empty() {
        return Err(CodecError::TrailingBytes(rest.len()));
    }
    Ok(command)
}

async fn read_token<R>(reader: &mut R, expected: &'static str) -> Result<Vec<u8>, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = (MAX_TOKEN_LEN + 1) as u64;
    let read = (&mut *reader).take(limit).read_until(TERMINATOR, &mut buf).await?;

    if read == 0 {
        return Err(CodecError::UnexpectedEof { expected });
    }
    if buf.last() != Some(&TERMINATOR) {
        return Err(if buf.len() > MAX_TOKEN_LEN {
            CodecError::TokenTooLong {
                limit: MAX_TOKEN_LEN,
            }
        } else {
            CodecError::UnexpectedEof { expected }
        });
    }

    buf.pop();
    Ok(buf)
}

/// Read one command off a client stream
pub async fn read_command<R>(reader: &mut R) -> Result<Command, CodecError>
where
    R: AsyncBufRead + Unpin,
{
    let kind = parse_kind(&read_token(reader, "command").await?)?;
    let name = name_from_bytes(read_token(reader, "name").await?)?;

    Ok(match kind {
        CommandKind::Add => {
            let mut id = [0u8; ID_LEN];
            reader.read_exact(&mut id).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    CodecError::UnexpectedEof { expected: "queue id" }
                } else {
                    CodecError::Io(e)
                }
            })?;
            Command::Add {
                name,
                handle: QueueHandle::new(u32::from_be_bytes(id)),
            }
        }
        CommandKind::Remove => Command::Remove { name },
        CommandKind::Find => Command::Find { name },
    })
}
