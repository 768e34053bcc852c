//! Name-service client
//!
//! Speaks the client-facing socket protocol: one command per connection,
//! one reply back. Used by the CLI verbs and by integration tests.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::debug;

use crate::mailbox::QueueHandle;
use crate::protocol::{encode_command, read_reply, Command, Reply};
use crate::transport::{Connector, ListenAddr};

/// Configuration for client behavior
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for one whole request/reply exchange
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

pub struct NameServiceClient {
    addr: ListenAddr,
    config: ClientConfig,
}

impl NameServiceClient {
    pub fn new(addr: ListenAddr) -> Self {
        Self::with_config(addr, ClientConfig::default())
    }

    pub fn with_config(addr: ListenAddr, config: ClientConfig) -> Self {
        Self { addr, config }
    }

    /// Send one command and wait for its reply
    pub async fn send(&self, command: &Command) -> Result<Reply> {
        tokio::time::timeout(self.config.timeout, self.exchange(command))
            .await
            .with_context(|| {
                format!(
                    "No reply from {} within {:?}",
                    self.addr, self.config.timeout
                )
            })?
    }

    async fn exchange(&self, command: &Command) -> Result<Reply> {
        debug!("Sending {:?} '{}' to {}", command.kind(), command.name(), self.addr);

        let mut conn = Connector::connect(&self.addr)
            .await
            .context("Failed to connect to name service")?;
        conn.write_all(&encode_command(command))
            .await
            .context("Failed to write command")?;
        conn.flush().await.context("Failed to flush command")?;

        let reply = read_reply(&mut BufReader::new(conn))
            .await
            .context("Failed to read reply")?;
        debug!("Received {}", reply.status);
        Ok(reply)
    }

    pub async fn add(&self, name: &str, handle: QueueHandle) -> Result<Reply> {
        self.send(&Command::Add {
            name: name.to_string(),
            handle,
        })
        .await
    }

    pub async fn find(&self, name: &str) -> Result<Reply> {
        self.send(&Command::Find {
            name: name.to_string(),
        })
        .await
    }

    pub async fn remove(&self, name: &str) -> Result<Reply> {
        self.send(&Command::Remove {
            name: name.to_string(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{read_command, Status};
    use crate::transport::Listener;
    use tempfile::TempDir;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_add_writes_command_and_reads_reply() {
        let dir = TempDir::new().unwrap();
        let addr = ListenAddr::Unix(dir.path().join("c.sock"));
        let mut listener = Listener::new(addr.clone());
        listener.init().await.unwrap();

        let server = tokio::spawn(async move {
            let (conn, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = tokio::io::split(conn);
            let command = read_command(&mut BufReader::new(read_half)).await.unwrap();
            write_half
                .write_all(&Reply::status(Status::OkAdd).encode())
                .await
                .unwrap();
            command
        });

        let client = NameServiceClient::new(addr);
        let reply = client.add("printer1", QueueHandle::new(42)).await.unwrap();
        assert_eq!(reply.status, Status::OkAdd);
        assert_eq!(
            server.await.unwrap(),
            Command::Add {
                name: "printer1".into(),
                handle: QueueHandle::new(42)
            }
        );
    }

    #[tokio::test]
    async fn test_connect_failure_has_context() {
        let dir = TempDir::new().unwrap();
        let client = NameServiceClient::new(ListenAddr::Unix(dir.path().join("absent.sock")));
        let err = client.find("x").await.unwrap_err();
        assert!(err.to_string().contains("connect"));
    }
}
