//! Service core: the single task that owns the name registry
//!
//! Requests arrive on the core mailbox one at a time and are applied in
//! arrival order. Each reply goes to the mailbox handle carried inside the
//! request itself.

use flume::Receiver;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::errors::AppResult;
use crate::mailbox::{
    Mailbox, MailboxBroker, MailboxError, MailboxKey, QueueHandle, QueueProbe, ANY_TAG, REPLY_TAG,
};
use crate::protocol::internal::peek_reply_to;
use crate::protocol::{decode_request, Command, Reply, RequestBody, Status};
use crate::registry::NameRegistry;

/// Well-known key of the core mailbox
pub const CORE_MAILBOX_KEY: u32 = 0x4d51_4e44;

pub struct ServiceCore {
    mailbox: Mailbox,
    broker: MailboxBroker,
    registry: NameRegistry,
    probe: Arc<dyn QueueProbe>,
    shutdown_receiver: Receiver<()>,
    requests: Arc<AtomicU64>,
}

impl ServiceCore {
    /// Create the core mailbox and an empty registry
    pub fn new(
        broker: MailboxBroker,
        probe: Arc<dyn QueueProbe>,
        shutdown_receiver: Receiver<()>,
    ) -> AppResult<Self> {
        let mailbox = broker.create(MailboxKey::Named(CORE_MAILBOX_KEY))?;
        info!("Service core mailbox is {}", mailbox.handle());

        Ok(Self {
            mailbox,
            broker,
            registry: NameRegistry::new(),
            probe,
            shutdown_receiver,
            requests: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Handle handlers send requests to
    pub fn handle(&self) -> QueueHandle {
        self.mailbox.handle()
    }

    pub fn registry(&self) -> &NameRegistry {
        &self.registry
    }

    /// Shared count of decoded requests, for status and tests
    pub fn requests_counter(&self) -> Arc<AtomicU64> {
        self.requests.clone()
    }

    /// Apply one command to the registry
    pub fn apply(&mut self, command: &Command) -> Reply {
        let outcome = match command {
            Command::Add { name, handle } => self
                .registry
                .add(name, *handle, self.probe.as_ref())
                .map(|()| Reply::status(Status::OkAdd)),
            Command::Remove { name } => self
                .registry
                .remove(name)
                .map(|_| Reply::status(Status::OkRemove)),
            Command::Find { name } => self.registry.find(name).map(Reply::found),
        };

        match outcome {
            Ok(reply) => {
                info!("{:?} '{}' -> {}", command.kind(), command.name(), reply.status);
                reply
            }
            Err(e) => {
                debug!("{:?} '{}' rejected: {}", command.kind(), command.name(), e);
                Reply::status(e.status())
            }
        }
    }

    /// Decode and answer one mailbox payload
    fn handle_payload(&mut self, payload: &[u8]) {
        let (reply_to, reply) = match decode_request(payload) {
            Ok(request) => match request.body {
                RequestBody::Command(command) => {
                    self.requests.fetch_add(1, Ordering::Relaxed);
                    (request.reply_to, self.apply(&command))
                }
                RequestBody::Unrecognized { code } => {
                    info!("Acknowledging unrecognized request (code {:?})", code);
                    (request.reply_to, Reply::status(Status::MsgOk))
                }
            },
            Err(e) => match peek_reply_to(payload) {
                Some(reply_to) => {
                    warn!("Malformed request from {}: {}", reply_to, e);
                    (reply_to, Reply::status(Status::MsgOk))
                }
                None => {
                    warn!("Dropping {} byte request without reply handle", payload.len());
                    return;
                }
            },
        };

        match self.broker.send_to(reply_to, &reply.encode(), REPLY_TAG) {
            Ok(()) => {}
            Err(MailboxError::Unknown(handle)) => {
                debug!("Reply mailbox {} is gone, discarding {}", handle, reply.status)
            }
            Err(e) => warn!("Failed to reply to {}: {}", reply_to, e),
        }
    }

    /// Serve requests until shutdown or until the core mailbox is removed
    pub async fn run(mut self) -> AppResult<()> {
        info!("Service core started");
        let max_len = self.broker.limits().max_message_size;

        loop {
            tokio::select! {
                _ = self.shutdown_receiver.recv_async() => {
                    info!("Service core received shutdown signal");
                    break;
                }

                result = self.mailbox.receive(max_len, ANY_TAG) => {
                    match result {
                        Ok(message) => self.handle_payload(&message.payload),
                        Err(MailboxError::Removed(handle)) => {
                            info!("Core mailbox {} removed, stopping", handle);
                            break;
                        }
                        Err(e) => {
                            error!("Core mailbox receive failed: {}", e);
                            return Err(e.into());
                        }
                    }
                }
            }
        }

        info!(
            "Service core stopped with {} registered names",
            self.registry.len()
        );
        Ok(())
    }
}
