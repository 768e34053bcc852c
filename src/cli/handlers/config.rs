//! Configuration management handler

use anyhow::{Context, Result};

use super::super::CliContext;

/// Handler for configuration operations
pub struct ConfigHandler<'a> {
    context: &'a CliContext,
}

impl<'a> ConfigHandler<'a> {
    /// Create new configuration handler
    pub fn new(context: &'a CliContext) -> Self {
        Self { context }
    }

    /// Write the effective configuration, command-line overrides included
    pub async fn handle_init(&self, force: bool) -> Result<()> {
        let config_manager = &self.context.config_manager;
        let config_path = config_manager.config_path();

        if config_path.exists() && !force {
            println!("Configuration already initialized at: {}", config_path.display());
            println!("Use --force to overwrite");
            return Ok(());
        }

        config_manager
            .save()
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("Configuration initialized successfully at: {}", config_path.display());
        Ok(())
    }
}
