//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::constants;

/// Tunnelgate - keeps a torrent client behind a verified VPN tunnel
#[derive(Parser, Debug)]
#[command(author, version = constants::APP_VERSION, about, long_about = None)]
pub struct Args {
    /// Configuration file (defaults to the system path, then the user config dir)
    #[arg(short, long, global = true, env = constants::CONFIG_ENV_VAR)]
    pub config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to execute (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run one pass of the job: tunnel, torrent client and feed fetcher
    Run,
    /// Bring the tunnel up, verify it and apply routing
    Up {
        /// Connection attempts (overrides `vpn.max_attempts`)
        #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
        attempts: Option<u32>,
    },
    /// Stop the torrent client and the tunnel
    Down,
    /// Show the tunnel state
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration file and exit
    CheckConfig,
}
