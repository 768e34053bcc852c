//! CLI Context for dependency injection and shared state
//!
//! This module provides the CliContext abstraction that centralizes
//! configuration loading, command-line overrides and logging setup.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;

use crate::config::{Config, ConfigManager};
use crate::transport::ListenAddr;

/// Command-line values that take precedence over the configuration file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<String>,
    pub pid_file: Option<PathBuf>,
}

/// CLI execution context containing shared dependencies and configuration
#[derive(Clone)]
pub struct CliContext {
    pub verbose: bool,
    pub config_manager: Arc<ConfigManager>,
}

impl CliContext {
    /// Load configuration and apply command-line overrides
    pub fn new(config_path: Option<PathBuf>, verbose: bool, overrides: Overrides) -> Result<Self> {
        let mut config_manager =
            ConfigManager::new(config_path).context("Failed to load configuration")?;

        let config = config_manager.config_mut();
        if let Some(listen) = overrides.listen {
            config.server.listen = listen
                .parse::<ListenAddr>()
                .with_context(|| format!("Invalid --listen address '{listen}'"))?;
        }
        if let Some(pid_file) = overrides.pid_file {
            config.server.pid_file = Some(pid_file);
        }

        Ok(Self {
            verbose,
            config_manager: Arc::new(config_manager),
        })
    }

    pub fn config(&self) -> &Config {
        self.config_manager.config()
    }

    fn log_level(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.config().logging.level
        }
    }

    fn env_filter(&self) -> tracing_subscriber::EnvFilter {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(
            self.log_level()
                .parse()
                .unwrap_or_else(|_| tracing::Level::INFO.into()),
        )
    }

    /// Initialize logging subsystem based on verbosity and configuration
    ///
    /// Detached daemons have no console and log only to the rolling file.
    /// In the foreground, logs go to stderr, and also to the file when
    /// `logging.path` is set. The returned guard must outlive all logging.
    pub fn init_logging(&self, detached: bool) -> Result<Option<WorkerGuard>> {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::{fmt, Layer, Registry};

        let logging = &self.config().logging;
        let file_path = if detached {
            Some(logging.detached_log_path())
        } else {
            logging.path.clone()
        };

        let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
        if !detached {
            layers.push(fmt::layer().with_writer(std::io::stderr).boxed());
        }

        let mut guard = None;
        if let Some(log_path) = &file_path {
            let (file_writer, file_guard) = rolling_file(log_path)?;
            layers.push(
                fmt::layer()
                    .with_writer(file_writer)
                    .with_ansi(false)
                    .boxed(),
            );
            guard = Some(file_guard);
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(self.env_filter())
            .try_init()
            .context("Failed to initialize logging")?;

        if let Some(log_path) = &file_path {
            tracing::debug!("Logging to {}", log_path.display());
        }
        tracing::debug!("Config path: {}", self.config_manager.config_path().display());
        Ok(guard)
    }
}

fn rolling_file(
    log_path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = log_path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let file_name = log_path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("mqnamed.log"));

    let appender = tracing_appender::rolling::daily(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}
