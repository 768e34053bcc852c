//! Command handlers for all CLI operations
//!
//! This module routes parsed commands to the handler responsible for them,
//! keeping CLI parsing apart from daemon and client logic.

pub mod client;
pub mod config;
pub mod daemon;

use anyhow::Result;

use super::{CliContext, Commands};
use client::ClientHandler;
use config::ConfigHandler;
use daemon::DaemonHandler;

/// Coordinates all command handling operations with dependency injection via CliContext
pub struct CommandHandler {
    context: CliContext,
}

impl CommandHandler {
    /// Create a new command handler instance with the provided context
    pub fn new(context: CliContext) -> Self {
        Self { context }
    }

    /// Route commands to their appropriate handlers
    pub async fn handle_command(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Serve { force, .. } => DaemonHandler::new(&self.context).handle_serve(force).await,
            Commands::Stop => DaemonHandler::new(&self.context).handle_stop().await,
            Commands::Status => DaemonHandler::new(&self.context).handle_status().await,
            Commands::Add { name, id } => ClientHandler::new(&self.context).handle_add(&name, id).await,
            Commands::Find { name } => ClientHandler::new(&self.context).handle_find(&name).await,
            Commands::Remove { name } => ClientHandler::new(&self.context).handle_remove(&name).await,
            Commands::Init { force } => ConfigHandler::new(&self.context).handle_init(force).await,
        }
    }
}
