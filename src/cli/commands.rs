//! Command definitions and structures for the CLI
//!
//! This module contains all the clap-based command line argument definitions,
//! including the main CLI structure and all subcommands.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure
#[derive(Parser)]
#[command(name = "mqnamed")]
#[command(about = "Name service daemon for message-queue identifiers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to the per-user config directory)
    #[arg(long, global = true, env = "MQNAMED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to serve on or connect to, e.g. unix:///tmp/mqnamed.sock or tcp://127.0.0.1:7070
    #[arg(long, global = true, env = "MQNAMED_LISTEN")]
    pub listen: Option<String>,

    /// PID file guarding the single daemon instance
    #[arg(long, global = true)]
    pub pid_file: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the name service daemon
    Serve {
        /// Run in detached mode (background)
        #[arg(short = 'd', long)]
        detach: bool,

        /// Replace a PID file left behind by a daemon that is no longer running
        #[arg(short, long)]
        force: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Check daemon status
    Status,

    /// Register NAME for the queue with identifier ID
    Add {
        name: String,
        id: u32,
    },

    /// Look up the queue identifier registered for NAME
    Find { name: String },

    /// Remove the registration for NAME
    Remove { name: String },

    /// Write a configuration file with the default settings
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

impl Commands {
    /// Whether this command detaches from the terminal before running
    pub fn detaches(&self) -> bool {
        matches!(self, Commands::Serve { detach: true, .. })
    }
}
