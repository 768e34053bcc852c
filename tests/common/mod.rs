//! Common test utilities and helpers
//!
//! This module provides an in-process name server on a temporary Unix
//! socket, raw socket helpers, and a builder for driving the CLI binary.

#![allow(dead_code)]

use assert_cmd::Command;
use mqnamed::config::Config;
use mqnamed::mailbox::{MailboxBroker, ProbeKind};
use mqnamed::transport::{Connector, ListenAddr};
use mqnamed::{NameServer, NameServiceClient, ShutdownHandle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;

/// A running in-process name server, by default validating handles against
/// its own broker
pub struct TestServer {
    pub dir: TempDir,
    pub addr: ListenAddr,
    pub broker: MailboxBroker,
    pub core: mqnamed::QueueHandle,
    requests: Arc<AtomicU64>,
    shutdown: ShutdownHandle,
    task: JoinHandle<mqnamed::AppResult<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with_timeout(Duration::from_secs(2)).await
    }

    pub async fn start_with_timeout(timeout: Duration) -> Self {
        Self::start_with(|config| {
            config.server.handler_timeout_ms = timeout.as_millis() as u64;
        })
        .await
    }

    /// Start with the local probe, after letting `configure` adjust the config
    pub async fn start_with(configure: impl FnOnce(&mut Config)) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = Config::default();
        config.server.listen = ListenAddr::Unix(dir.path().join("mqnamed.sock"));
        config.registry.queue_probe = ProbeKind::Local;
        configure(&mut config);

        let server = NameServer::bind(&config).await.expect("Failed to bind server");
        let addr = server.local_addr().clone();
        let broker = server.broker().clone();
        let core = server.core_handle();
        let requests = server.requests_handled();
        let shutdown = server.shutdown_handle();
        let task = tokio::spawn(server.run());

        Self {
            dir,
            addr,
            broker,
            core,
            requests,
            shutdown,
            task,
        }
    }

    pub fn client(&self) -> NameServiceClient {
        NameServiceClient::new(self.addr.clone())
    }

    pub fn requests_handled(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.dir.path().join("mqnamed.sock")
    }

    /// Stop the server; the returned directory still holds its files
    pub async fn stop(self) -> TempDir {
        self.shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("Server did not stop in time")
            .expect("Server task panicked")
            .expect("Server returned an error");
        self.dir
    }
}

/// Write raw bytes, half-close, and collect everything the server sends back
pub async fn exchange_raw(addr: &ListenAddr, bytes: &[u8]) -> Vec<u8> {
    let mut conn = Connector::connect(addr).await.expect("Failed to connect");
    conn.write_all(bytes).await.expect("Failed to write");
    conn.shutdown().await.expect("Failed to half-close");
    read_all(&mut conn).await
}

/// Read until the server closes; a reset counts as the end of the stream
pub async fn read_all<R: AsyncRead + Unpin>(reader: &mut R) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), reader.read_to_end(&mut buf)).await;
    buf
}

/// Test command builder for the mqnamed CLI
pub struct TestCommand {
    cmd: Command,
}

impl TestCommand {
    /// Create a command whose config and PID file live under `dir`
    pub fn in_dir(dir: &Path) -> Self {
        let mut cmd = Command::cargo_bin("mqnamed").expect("Failed to find mqnamed binary");
        cmd.arg("--config")
            .arg(dir.join("config.toml"))
            .arg("--pid-file")
            .arg(dir.join("mqnamed.pid"))
            .arg("--listen")
            .arg(dir.join("mqnamed.sock"))
            .env_remove("MQNAMED_CONFIG")
            .env_remove("MQNAMED_LISTEN")
            .timeout(Duration::from_secs(20));
        Self { cmd }
    }

    /// Add arguments to the command
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        self.cmd.args(args);
        self
    }

    pub fn assert(mut self) -> assert_cmd::assert::Assert {
        self.cmd.assert()
    }
}

/// Poll until `path` exists or the deadline passes
pub fn wait_for_path(path: &Path, deadline: Duration) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if path.exists() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    false
}
