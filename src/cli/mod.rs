//! CLI module providing command-line interface functionality
//!
//! This module handles argument parsing, command validation, and routing
//! to appropriate handlers while maintaining separation of concerns.

pub mod commands;
pub mod context;
pub mod handlers;

use anyhow::{Context, Result};
use clap::Parser;

pub use commands::{Cli, Commands};
pub use context::{CliContext, Overrides};
pub use handlers::CommandHandler;

use crate::daemon::lifecycle;
use handlers::daemon::DaemonHandler;

/// Main CLI application
pub struct CliApp;

impl CliApp {
    /// Parse command line arguments and execute the requested command
    ///
    /// Detaching forks the process, so it happens here, before logging
    /// worker threads or the async runtime exist.
    pub fn run() -> Result<()> {
        let cli = Cli::parse();

        let context = CliContext::new(
            cli.config.clone(),
            cli.verbose,
            Overrides {
                listen: cli.listen.clone(),
                pid_file: cli.pid_file.clone(),
            },
        )?;

        let detached = cli.command.detaches();
        if let Commands::Serve {
            detach: true,
            force,
        } = &cli.command
        {
            DaemonHandler::check_can_start(&context, *force)?;
            let cwd = std::env::current_dir().context("Failed to read working directory")?;
            println!("Starting daemon in detached mode...");
            lifecycle::daemonize(&cwd)?;
        }

        // Held until exit so buffered log lines are flushed.
        let _log_guard = context.init_logging(detached)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to build async runtime")?;

        let handler = CommandHandler::new(context);
        runtime.block_on(handler.handle_command(cli.command))
    }
}
