//! Per-connection protocol handler
//!
//! Each accepted connection gets one handler task that runs a single
//! request/response cycle under a deadline: read the command, forward it to
//! the service core with a private reply mailbox, relay the reply.

use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::mailbox::{MailboxBroker, MailboxKey, QueueHandle, ANY_TAG, REQUEST_TAG};
use crate::protocol::{encode_request, read_command, Reply, Status};
use crate::transport::Connection;

/// Deadline for writing the timeout notice itself
const TIMEOUT_NOTICE_DEADLINE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    Connected,
    Decoding,
    /// Forwarding the request to the core and waiting for its answer
    AwaitingReply,
    Replying,
    Terminated,
}

impl HandlerState {
    /// Whether reply bytes may already be on the wire
    pub fn reply_started(self) -> bool {
        matches!(self, Self::Replying | Self::Terminated)
    }
}

pub struct ProtocolHandler {
    reader: BufReader<tokio::io::ReadHalf<Connection>>,
    writer: tokio::io::WriteHalf<Connection>,
    peer: String,
    broker: MailboxBroker,
    core: QueueHandle,
    timeout: Duration,
}

impl ProtocolHandler {
    pub fn new(
        conn: Connection,
        peer: String,
        broker: MailboxBroker,
        core: QueueHandle,
        timeout: Duration,
    ) -> Self {
        let (read_half, writer) = tokio::io::split(conn);
        Self {
            reader: BufReader::new(read_half),
            writer,
            peer,
            broker,
            core,
            timeout,
        }
    }

    /// Run one request/response cycle, returning the status relayed
    ///
    /// Protocol errors close the connection without a reply and without
    /// touching the registry. On timeout the client gets `ERROR_TIMEOUT`,
    /// unless part of the reply was already written, and the handler
    /// returns `AppError::Timeout`.
    pub async fn run(mut self) -> AppResult<Status> {
        let mut state = HandlerState::Connected;
        debug!("Handling connection from {}", self.peer);

        let result = tokio::time::timeout(self.timeout, self.cycle(&mut state)).await;

        match result {
            Ok(Ok(status)) => {
                state = HandlerState::Terminated;
                debug!("Connection from {} finished ({:?})", self.peer, state);
                Ok(status)
            }
            Ok(Err(e)) => {
                warn!("Closing connection from {}: {}", self.peer, e);
                Err(e)
            }
            Err(_) => {
                info!(
                    "Connection from {} timed out after {:?} while {:?}",
                    self.peer, self.timeout, state
                );
                if !state.reply_started() {
                    self.send_timeout_notice().await;
                }
                Err(AppError::Timeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn cycle(&mut self, state: &mut HandlerState) -> AppResult<Status> {
        *state = HandlerState::Decoding;
        let command = read_command(&mut self.reader).await?;
        debug!("{} sent {:?} '{}'", self.peer, command.kind(), command.name());

        *state = HandlerState::AwaitingReply;
        let reply_box = self.broker.create(MailboxKey::Private)?;
        let request = encode_request(reply_box.handle(), &command);
        // A full core mailbox holds the request back until the deadline.
        self.broker
            .send_when_ready(self.core, &request, REQUEST_TAG)
            .await?;

        let max_len = self.broker.limits().max_message_size;
        let message = reply_box.receive(max_len, ANY_TAG).await?;
        let status = Reply::decode(&message.payload)?.status;

        *state = HandlerState::Replying;
        self.writer.write_all(&message.payload).await?;
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(status)
    }

    async fn send_timeout_notice(&mut self) {
        let notice = Reply::status(Status::Timeout).encode();
        let write = async {
            self.writer.write_all(&notice).await?;
            self.writer.flush().await
        };
        match tokio::time::timeout(TIMEOUT_NOTICE_DEADLINE, write).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Could not send timeout notice to {}: {}", self.peer, e),
            Err(_) => debug!("Timeout notice to {} did not drain", self.peer),
        }
    }
}
