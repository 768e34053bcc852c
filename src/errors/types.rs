//! Error types for the mqnamed service
//!
//! Each subsystem owns a narrow error enum; `AppError` aggregates them for
//! the daemon and CLI layers so callers can classify failures uniformly.

use std::path::PathBuf;
use thiserror::Error;

use crate::daemon::lifecycle::LifecycleError;
use crate::mailbox::MailboxError;
use crate::protocol::CodecError;
use crate::transport::TransportError;

/// Main application error type
///
/// Organized by functional domain. Application failures never appear here:
/// the registry's errors are answered to clients as status strings.
#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid configuration value for '{key}': {value}")]
    InvalidConfigValue { key: String, value: String },

    // Resource errors (fatal at startup)
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    // Protocol errors (contained by a single connection)
    #[error(transparent)]
    Protocol(#[from] CodecError),

    #[error("Connection timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    // I/O errors
    #[error("File I/O error for '{path}': {operation}")]
    Io {
        path: PathBuf,
        operation: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Create a new Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new Config error with source
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new I/O error with source
    pub fn io_with_source(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Io {
            path: path.into(),
            operation: operation.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } | Self::InvalidConfigValue { .. } => "config",
            Self::Transport(_) | Self::Mailbox(_) | Self::Lifecycle(_) | Self::Io { .. } => {
                "resource"
            }
            Self::Protocol(_) => "protocol",
            Self::Timeout { .. } => "timeout",
            Self::Internal { .. } => "internal",
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        let operation = match err.kind() {
            std::io::ErrorKind::NotFound => "file not found",
            std::io::ErrorKind::PermissionDenied => "permission denied",
            std::io::ErrorKind::AlreadyExists => "already exists",
            std::io::ErrorKind::TimedOut => "timeout",
            _ => "I/O operation",
        }
        .to_string();

        Self::Io {
            path: PathBuf::from("unknown"),
            operation,
            source: Some(Box::new(err)),
        }
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::config_with_source("failed to parse TOML", err)
    }
}
