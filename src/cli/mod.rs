//! CLI module for the forecast assistant.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Forecast Assistant - news digests and a multi-agent chat for your forecasts
///
/// Emails a daily summary of how the news bears on your open forecasts, and
/// answers questions about them through a team of routed agents.
#[derive(Parser, Debug)]
#[command(name = "forecast-assistant")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Summarize today's news against your open forecasts and email the result
    Digest {
        /// Number of labelled emails to read (default from config)
        #[arg(short = 'n', long)]
        count: Option<u32>,

        /// Gmail label to read (default from config)
        #[arg(short, long)]
        label: Option<String>,

        /// Print the summary instead of sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Start an interactive chat with the forecast agents
    Chat,

    /// Serve the agent chat over a WebSocket
    Serve {
        /// Host to bind to (default from config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (default from config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Authorize Gmail access in the browser
    Auth,

    /// Check credentials and configuration
    Doctor,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
