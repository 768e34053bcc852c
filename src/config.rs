use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{AppError, AppResult};
use crate::mailbox::{MailboxLimits, ProbeKind};
use crate::transport::ListenAddr;

/// Smallest mailbox message that still holds a maximal request
const MIN_MESSAGE_SIZE: usize = 512;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub mailbox: MailboxLimits,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: ListenAddr,
    pub pid_file: Option<PathBuf>,
    pub handler_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RegistryConfig {
    pub queue_probe: ProbeKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen: ListenAddr::Unix(runtime_dir().join("mqnamed.sock")),
            pid_file: None,
            handler_timeout_ms: 2000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            path: None,
        }
    }
}

impl ServerConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    /// Configured PID file, or the default under the runtime directory
    pub fn pid_file_path(&self) -> PathBuf {
        self.pid_file
            .clone()
            .unwrap_or_else(|| runtime_dir().join("mqnamed.pid"))
    }
}

impl LoggingConfig {
    /// Log file for detached mode, where there is no console
    pub fn detached_log_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| state_dir().join("mqnamed.log"))
    }
}

impl Config {
    pub fn validate(&self) -> AppResult<()> {
        if self.server.handler_timeout_ms == 0 {
            return Err(AppError::InvalidConfigValue {
                key: "server.handler_timeout_ms".into(),
                value: "0".into(),
            });
        }
        if self.mailbox.max_message_size < MIN_MESSAGE_SIZE {
            return Err(AppError::InvalidConfigValue {
                key: "mailbox.max_message_size".into(),
                value: self.mailbox.max_message_size.to_string(),
            });
        }
        if self.mailbox.max_messages == 0 {
            return Err(AppError::InvalidConfigValue {
                key: "mailbox.max_messages".into(),
                value: "0".into(),
            });
        }
        Ok(())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "mqnamed")
}

/// Directory for the socket and PID file
fn runtime_dir() -> PathBuf {
    project_dirs()
        .and_then(|dirs| dirs.runtime_dir().map(Path::to_path_buf))
        .unwrap_or_else(std::env::temp_dir)
}

/// Directory for the detached-mode log
fn state_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_local_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir)
}

pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Load the configuration at `path`, or the default location
    ///
    /// A missing file yields the built-in defaults; nothing is written.
    pub fn new(path: Option<PathBuf>) -> AppResult<Self> {
        let config_path = match path {
            Some(path) => path,
            None => Self::default_config_path()?,
        };
        let config = Self::load_or_default(&config_path)?;
        config.validate()?;

        Ok(ConfigManager {
            config_path,
            config,
        })
    }

    pub fn default_config_path() -> AppResult<PathBuf> {
        let dirs = project_dirs()
            .ok_or_else(|| AppError::config("Failed to determine the configuration directory"))?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    fn load_or_default(path: &Path) -> AppResult<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| AppError::io_with_source(path, "read config", e))?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self) -> AppResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::io_with_source(parent, "create config directory", e))?;
        }
        let content = toml::to_string_pretty(&self.config)
            .map_err(|e| AppError::config_with_source("Failed to serialize config", e))?;
        fs::write(&self.config_path, content)
            .map_err(|e| AppError::io_with_source(&self.config_path, "write config", e))?;
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }
}
