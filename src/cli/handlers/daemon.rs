//! Daemon management handler
//!
//! This module handles the daemon-related commands: serve, stop and status.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use super::super::CliContext;
use crate::daemon::lifecycle::{
    self, daemon_state, fmt_pid, is_locked, is_process_running, send_terminate,
};
use crate::daemon::{DaemonState, LifecycleError, NameServer, PidFile};

/// How long `stop` waits for the daemon to exit
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Handler for daemon operations
pub struct DaemonHandler<'a> {
    context: &'a CliContext,
}

impl<'a> DaemonHandler<'a> {
    /// Create new daemon handler
    pub fn new(context: &'a CliContext) -> Self {
        Self { context }
    }

    /// Refuse to detach when the PID file would reject the daemon anyway
    ///
    /// Runs before forking so the error still reaches the terminal.
    pub fn check_can_start(context: &CliContext, force: bool) -> Result<()> {
        let pid_path = context.config().server.pid_file_path();
        match daemon_state(&pid_path)? {
            DaemonState::NotRunning => Ok(()),
            DaemonState::Running(pid) => Err(LifecycleError::AlreadyRunning {
                path: pid_path,
                pid: Some(pid),
            }
            .into()),
            DaemonState::Stale(_) if force => Ok(()),
            DaemonState::Stale(pid) => {
                Err(LifecycleError::PidFileExists { path: pid_path, pid }.into())
            }
        }
    }

    /// Run the name server until SIGINT or SIGTERM
    pub async fn handle_serve(&self, force: bool) -> Result<()> {
        let config = self.context.config();
        let pid_path = config.server.pid_file_path();

        let pid_file = PidFile::acquire(&pid_path, force)
            .with_context(|| format!("Cannot take PID file {}", pid_path.display()))?;
        info!("Daemon started with PID: {}", std::process::id());

        let server = NameServer::bind(config)
            .await
            .context("Failed to start name server")?
            .with_pid_file(pid_file);

        let shutdown = server.shutdown_handle();
        let signals = scopeguard::guard(
            tokio::spawn(async move {
                match lifecycle::shutdown_signal().await {
                    Ok(_) => shutdown.shutdown(),
                    Err(e) => error!("Signal handling unavailable: {}", e),
                }
            }),
            |task| task.abort(),
        );

        let result = server.run().await;
        drop(signals);

        result.context("Name server failed")?;
        info!("Daemon cleanup completed");
        Ok(())
    }

    /// Handle daemon stop command
    pub async fn handle_stop(&self) -> Result<()> {
        let pid_path = self.context.config().server.pid_file_path();

        match daemon_state(&pid_path)? {
            DaemonState::Running(pid) => {
                send_terminate(pid)?;
                info!("Sent SIGTERM to daemon process {}", pid);

                if wait_for_exit(pid, &pid_path).await {
                    println!("Daemon stopped successfully");
                } else {
                    println!("Warning: Daemon may still be running after stop signal");
                }
            }
            DaemonState::Stale(pid) => {
                std::fs::remove_file(&pid_path).with_context(|| {
                    format!("Failed to remove stale PID file {}", pid_path.display())
                })?;
                println!(
                    "Daemon is not running (removed stale PID file for pid {})",
                    fmt_pid(&pid)
                );
            }
            DaemonState::NotRunning => println!("Daemon is not running"),
        }

        Ok(())
    }

    /// Handle daemon status command
    pub async fn handle_status(&self) -> Result<()> {
        let config = self.context.config();
        let pid_path = config.server.pid_file_path();

        match daemon_state(&pid_path)? {
            DaemonState::Running(pid) => {
                println!("Daemon is running (PID: {})", pid);
                println!("  Listening on: {}", config.server.listen);
                println!("  PID file: {}", pid_path.display());
            }
            DaemonState::Stale(pid) => {
                println!(
                    "Daemon is not running (stale PID file {} for pid {})",
                    pid_path.display(),
                    fmt_pid(&pid)
                );
            }
            DaemonState::NotRunning => println!("Daemon is not running"),
        }

        Ok(())
    }
}

/// Poll until the daemon has released its PID file or exited
async fn wait_for_exit(pid: u32, pid_path: &Path) -> bool {
    let start_time = Instant::now();
    while start_time.elapsed() < STOP_TIMEOUT {
        // An exited but unreaped process still answers kill(0).
        if !is_locked(pid_path) || !is_process_running(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    debug!("Process {} still present after {:?}", pid, STOP_TIMEOUT);
    false
}
