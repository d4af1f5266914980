use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use crate::config::Config;

/// The command line interface for serial hub.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to a configuration file
    pub config: Option<PathBuf>,

    /// Listen on this port instead of the configured one.
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Open this serial device instead of the configured one.
    #[arg(short, long, conflicts_with = "mock")]
    pub device: Option<PathBuf>,

    /// Do not open a serial port, but use an in-memory device
    /// which answers each line with that same line.
    #[arg(long)]
    pub mock: bool,

    /// How much to log to stdout.
    #[arg(long, default_value_t = Level::INFO)]
    pub log_level: Level,

    /// Also log (at debug level) to daily rotated files in this directory.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Apply command line overrides on top of a configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.port {
            config.listen.port = port;
        }

        if let Some(device) = &self.device {
            config.device.path = device.clone();
        }
    }
}

/// Commands available in the command line interface.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Examples for user convenience.
    #[clap(subcommand)]
    Examples(Examples),
}

/// Helpful examples for users.
#[derive(Subcommand, Debug, Clone)]
pub enum Examples {
    /// Show an example of a configuration file's contents.
    Config,
}

/// Run a subcommand.
pub fn handle_command(command: Commands) {
    match command {
        Commands::Examples(Examples::Config) => {
            println!("{}", Config::example().serialize_pretty());
        }
    }
}
