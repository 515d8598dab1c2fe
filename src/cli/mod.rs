//! CLI module for grindcard
//!
//! Provides the command-line interface with:
//!
//! - One-shot entitlement evaluation at any instant
//! - A live session that prints each published snapshot
//! - Configuration file support
//!
//! ## Usage
//!
//! ```bash
//! # What can a user who signed up on New Year's Day do on the 3rd?
//! grindcard status --signup 2025-01-01T00:00:00Z --now 2025-01-03T12:00:00Z
//!
//! # JSON output for scripting
//! grindcard status --signup 2025-01-01T00:00:00Z --format json | jq '.canViewLeaderboard'
//!
//! # Live countdown, upgrading to a member after 20 seconds
//! grindcard watch --signup 2025-01-01T00:00:00Z --upgrade-after 20
//!
//! # Configuration management
//! grindcard config --list
//! grindcard config --set engine.trial_days=14
//! ```
//!
//! ## Module Structure
//!
//! - `commands`: CLI command definitions using clap
//! - `output`: Output formatters for different formats
//! - `config`: Configuration file handling

pub mod commands;
pub mod config;
pub mod output;

// Re-exports for convenience
pub use commands::{Cli, CliOutputFormat, Commands};
pub use config::{AppConfig, ConfigError, EngineSection, OutputConfig};
pub use output::{create_formatter, OutputFormat, OutputFormatter};
