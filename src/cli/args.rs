//! CLI arguments module
//!
//! Defines command-line argument parsing using clap.

use clap::Parser;
use std::net::IpAddr;

/// CLI arguments for the overlay node launcher
#[derive(Debug, Parser)]
#[command(name = "overlay-dht")]
#[command(about = "Start a DHT overlay and join nodes to it", long_about = None)]
pub struct CliArgs {
    /// Host joining nodes use to reach the bootstrapper
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Address every node listens on
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Bootstrapper listening port (0 = ephemeral)
    #[arg(short, long, default_value_t = 0)]
    pub port: u16,

    /// Identifier width in bits
    #[arg(long, default_value_t = 160)]
    pub hash_length: usize,

    /// Routing table branching factor
    #[arg(long, default_value_t = 4)]
    pub base: usize,

    /// Number of nodes to join to the bootstrapper
    #[arg(short, long, default_value_t = 1)]
    pub joiners: usize,

    /// Seconds to wait for a bootstrapper's ACCEPT
    #[arg(long, default_value_t = 10)]
    pub join_timeout: u64,

    /// Exit once all nodes have joined instead of serving until Ctrl-C
    #[arg(long)]
    pub exit_after_join: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet mode (no output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl CliArgs {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Get the log level based on verbosity settings
    pub fn log_level(&self) -> tracing::Level {
        if self.verbose {
            tracing::Level::DEBUG
        } else if self.quiet {
            tracing::Level::ERROR
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let args = CliArgs::try_parse_from(["overlay-dht"]).unwrap();

        assert_eq!(args.host, "localhost");
        assert_eq!(args.port, 0);
        assert_eq!(args.hash_length, 160);
        assert_eq!(args.base, 4);
        assert_eq!(args.joiners, 1);
        assert_eq!(args.join_timeout, 10);
        assert!(!args.exit_after_join);
        assert_eq!(args.log_level(), tracing::Level::INFO);
    }

    #[test]
    fn test_overrides() {
        let args = CliArgs::try_parse_from([
            "overlay-dht", "--hash-length", "8", "--base", "2", "-j", "3", "-p", "7000", "-v",
        ])
        .unwrap();

        assert_eq!(args.hash_length, 8);
        assert_eq!(args.base, 2);
        assert_eq!(args.joiners, 3);
        assert_eq!(args.port, 7000);
        assert_eq!(args.log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_quiet_level() {
        let args = CliArgs::try_parse_from(["overlay-dht", "-q"]).unwrap();
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
