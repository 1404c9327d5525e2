//! CLI module
//!
//! Command-line interface for the overlay node launcher.

pub mod args;
pub mod config;

pub use args::CliArgs;
pub use config::Config;
