//! Connection dispatcher
//!
//! Accepts connections and spawns one `ProtocolHandler` task per client.
//! Finished handlers are reaped as they complete so a panic in one of them
//! is logged without touching the others.

use flume::Receiver;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::handler::ProtocolHandler;
use crate::errors::{AppError, AppResult};
use crate::mailbox::{MailboxBroker, QueueHandle};
use crate::protocol::Status;
use crate::transport::Listener;

/// Pause after a failed accept, so a persistent failure cannot spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub struct ConnectionDispatcher {
    listener: Listener,
    broker: MailboxBroker,
    core: QueueHandle,
    timeout: Duration,
    shutdown_receiver: Receiver<()>,
}

impl ConnectionDispatcher {
    pub fn new(
        listener: Listener,
        broker: MailboxBroker,
        core: QueueHandle,
        timeout: Duration,
        shutdown_receiver: Receiver<()>,
    ) -> Self {
        Self {
            listener,
            broker,
            core,
            timeout,
            shutdown_receiver,
        }
    }

    /// Accept connections until shutdown
    pub async fn run(mut self) -> AppResult<()> {
        info!("Connection dispatcher started on {}", self.listener.addr());
        let mut handlers: JoinSet<AppResult<Status>> = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown_receiver.recv_async() => {
                    info!("Connection dispatcher received shutdown signal");
                    break;
                }

                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    reap(joined);
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((conn, peer)) => {
                            debug!("New connection from {}", peer);
                            let handler = ProtocolHandler::new(
                                conn,
                                peer,
                                self.broker.clone(),
                                self.core,
                                self.timeout,
                            );
                            handlers.spawn(handler.run());
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    }
                }
            }
        }

        if !handlers.is_empty() {
            info!("Aborting {} outstanding handlers", handlers.len());
        }
        handlers.shutdown().await;
        self.listener.shutdown();
        info!("Connection dispatcher stopped");
        Ok(())
    }
}

/// Log how a handler task ended; handlers already logged their own errors
fn reap(joined: Result<AppResult<Status>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(status)) => debug!("Handler replied {}", status),
        Ok(Err(AppError::Protocol(_) | AppError::Timeout { .. })) => {}
        Ok(Err(e)) => warn!("Handler failed ({}): {}", e.category(), e),
        Err(e) if e.is_panic() => error!("Handler task panicked: {}", e),
        Err(e) => debug!("Handler task cancelled: {}", e),
    }
}
