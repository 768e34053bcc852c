//! Daemon lifecycle: detaching, single-instance PID file, signals
//!
//! The PID file is created exclusively and held under an advisory `flock`
//! for the daemon's lifetime. A file left behind by an unclean shutdown is
//! only replaced when the caller forces it, and never while another live
//! process still holds the lock.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("PID file {path} already exists (pid {}); use --force if no daemon is running", fmt_pid(.pid))]
    PidFileExists { path: PathBuf, pid: Option<u32> },

    #[error("another instance holds {path} (pid {})", fmt_pid(.pid))]
    AlreadyRunning { path: PathBuf, pid: Option<u32> },

    #[error("PID file error at {path}")]
    PidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to daemonize: {0}")]
    Daemonize(String),

    #[error("failed to install signal handler")]
    Signal(#[source] std::io::Error),

    #[error("failed to signal process {pid}")]
    Kill {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Render a possibly unknown PID for messages
pub fn fmt_pid(pid: &Option<u32>) -> String {
    pid.map_or_else(|| "unknown".to_string(), |pid| pid.to_string())
}

fn pid_file_error(path: &Path) -> impl FnOnce(std::io::Error) -> LifecycleError + '_ {
    move |source| LifecycleError::PidFile {
        path: path.to_path_buf(),
        source,
    }
}

/// Try to take an exclusive advisory lock without waiting
fn try_lock(file: &File) -> std::io::Result<bool> {
    // SAFETY: flock only inspects the descriptor, which `file` keeps open.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}

/// Exclusive, locked PID file removed on drop
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    _file: File,
}

impl PidFile {
    pub fn acquire(path: &Path, force: bool) -> Result<Self, LifecycleError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(pid_file_error(path))?;
        }

        let file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let pid = read_pid(path).ok().flatten();
                if !force {
                    return Err(LifecycleError::PidFileExists {
                        path: path.to_path_buf(),
                        pid,
                    });
                }
                warn!(
                    "Overriding existing PID file {} (pid {})",
                    path.display(),
                    fmt_pid(&pid)
                );
                OpenOptions::new()
                    .write(true)
                    .open(path)
                    .map_err(pid_file_error(path))?
            }
            Err(e) => return Err(pid_file_error(path)(e)),
        };

        if !try_lock(&file).map_err(pid_file_error(path))? {
            return Err(LifecycleError::AlreadyRunning {
                path: path.to_path_buf(),
                pid: read_pid(path).ok().flatten(),
            });
        }

        let mut file = file;
        file.set_len(0).map_err(pid_file_error(path))?;
        writeln!(file, "{}", std::process::id()).map_err(pid_file_error(path))?;
        file.flush().map_err(pid_file_error(path))?;

        debug!("Acquired PID file {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed PID file {}", self.path.display()),
            Err(e) => warn!("Failed to remove PID file {}: {}", self.path.display(), e),
        }
    }
}

/// Read the PID recorded in a PID file, if there is one
pub fn read_pid(path: &Path) -> Result<Option<u32>, LifecycleError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content.trim().parse::<u32>().ok()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(pid_file_error(path)(e)),
    }
}

/// Whether the PID file is currently locked by a running daemon
pub fn is_locked(path: &Path) -> bool {
    let Ok(file) = OpenOptions::new().read(true).open(path) else {
        return false;
    };
    // Taking the lock ourselves means nobody held it; it is released on close.
    matches!(try_lock(&file), Ok(false))
}

pub fn is_process_running(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 performs only the existence and permission check.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Ask a daemon process to shut down
pub fn send_terminate(pid: u32) -> Result<(), LifecycleError> {
    let raw = libc::pid_t::try_from(pid).map_err(|_| LifecycleError::Kill {
        pid,
        source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
    })?;
    // SAFETY: plain kill(2) on a PID read from our own PID file.
    if unsafe { libc::kill(raw, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(LifecycleError::Kill {
            pid,
            source: std::io::Error::last_os_error(),
        })
    }
}

/// State of the daemon as seen through its PID file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    NotRunning,
    Running(u32),
    /// A PID file exists but nothing holds it
    Stale(Option<u32>),
}

pub fn daemon_state(path: &Path) -> Result<DaemonState, LifecycleError> {
    if !path.exists() {
        return Ok(DaemonState::NotRunning);
    }
    // The lock, not the recorded PID, says whether a daemon owns the file.
    match read_pid(path)? {
        Some(pid) if is_locked(path) => Ok(DaemonState::Running(pid)),
        other => Ok(DaemonState::Stale(other)),
    }
}

/// Detach from the controlling terminal
///
/// Must run before the async runtime or any logging worker thread starts,
/// since only the calling thread survives the fork.
pub fn daemonize(working_directory: &Path) -> Result<(), LifecycleError> {
    daemonize::Daemonize::new()
        .working_directory(working_directory)
        .start()
        .map_err(|e| LifecycleError::Daemonize(e.to_string()))
}

/// Resolve when SIGINT or SIGTERM arrives; returns the signal's name
pub async fn shutdown_signal() -> Result<&'static str, LifecycleError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).map_err(LifecycleError::Signal)?;
    let mut interrupt = signal(SignalKind::interrupt()).map_err(LifecycleError::Signal)?;

    let name = tokio::select! {
        _ = terminate.recv() => "SIGTERM",
        _ = interrupt.recv() => "SIGINT",
    };
    info!("Received {}, shutting down", name);
    Ok(name)
}
