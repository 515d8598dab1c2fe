//! CLI command definitions for grindcard
//!
//! Defines all CLI commands and arguments using clap derive macros.
//!
//! ## Commands
//!
//! - `status` - Evaluate a user's entitlements once
//! - `watch` - Run a live session and print every published snapshot
//! - `config` - Show or modify configuration

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use super::output::OutputFormat;

// =============================================================================
// Main CLI
// =============================================================================

/// grindcard - trial and membership entitlements
#[derive(Parser, Debug)]
#[command(name = "grindcard")]
#[command(about = "Trial and membership entitlements for Grindcard", long_about = None)]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Output format (CLI compatible)
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum CliOutputFormat {
    #[default]
    Human,
    Json,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Human => OutputFormat::Human,
            CliOutputFormat::Json => OutputFormat::Json,
        }
    }
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Evaluate entitlements at a single instant
    Status {
        /// Account creation instant (RFC 3339)
        #[arg(long)]
        signup: DateTime<Utc>,

        /// Evaluation instant (RFC 3339, default: now)
        #[arg(long)]
        now: Option<DateTime<Utc>>,

        /// User id shown in the output
        #[arg(long, default_value = "local-user")]
        user: String,

        /// Treat the user as a paying member
        #[arg(long, conflicts_with = "fetch_fails")]
        paid: bool,

        /// Simulate a failed membership lookup
        #[arg(long)]
        fetch_fails: bool,

        /// Output format (default from config)
        #[arg(short, long, value_enum)]
        format: Option<CliOutputFormat>,

        /// Override the trial length in days
        #[arg(long)]
        trial_days: Option<u64>,
    },

    /// Run a live session until Ctrl-C
    Watch {
        /// Account creation instant (RFC 3339)
        #[arg(long)]
        signup: DateTime<Utc>,

        /// User id to look up
        #[arg(long, default_value = "local-user")]
        user: String,

        /// Treat the user as a paying member
        #[arg(long, conflicts_with = "profiles")]
        paid: bool,

        /// JSON profile table used for membership lookups
        #[arg(long)]
        profiles: Option<PathBuf>,

        /// Simulated lookup latency in milliseconds
        #[arg(long, default_value = "0")]
        latency_ms: u64,

        /// Upgrade the user to a member after this many seconds
        #[arg(long)]
        upgrade_after: Option<u64>,

        /// Output format (default from config)
        #[arg(short, long, value_enum)]
        format: Option<CliOutputFormat>,

        /// Publish on every tick instead of every publish interval
        #[arg(long)]
        realtime: bool,
    },

    /// Show or modify configuration
    Config {
        /// Get a configuration value
        #[arg(long)]
        get: Option<String>,

        /// Set a configuration value (format: key=value)
        #[arg(long)]
        set: Option<String>,

        /// List all configuration values
        #[arg(long)]
        list: bool,

        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,

        /// Show configuration file path
        #[arg(long)]
        path: bool,
    },
}
