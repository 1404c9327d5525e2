//! CLI configuration module
//!
//! Turns CLI arguments into network and node settings.

use crate::cli::args::CliArgs;
use crate::dht::{NetworkConfig, NodeOptions};
use std::net::SocketAddr;
use std::time::Duration;
use anyhow::Result;

/// Configuration for the overlay launcher
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier space of the new overlay
    pub network: NetworkConfig,
    /// Host joining nodes dial
    pub host: String,
    /// Settings for the bootstrapper
    pub bootstrap_options: NodeOptions,
    /// Settings for each joining node
    pub join_options: NodeOptions,
    /// Number of nodes to join
    pub joiners: usize,
    /// Exit after joining
    pub exit_after_join: bool,
}

impl Config {
    /// Create configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Self {
        let join_timeout = Duration::from_secs(args.join_timeout);

        Self {
            network: NetworkConfig {
                hash_length: args.hash_length,
                base: args.base,
            },
            host: args.host.clone(),
            bootstrap_options: NodeOptions {
                listen_addr: SocketAddr::new(args.bind, args.port),
                join_timeout,
            },
            join_options: NodeOptions {
                listen_addr: SocketAddr::new(args.bind, 0),
                join_timeout,
            },
            joiners: args.joiners,
            exit_after_join: args.exit_after_join,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;

        if self.host.is_empty() {
            return Err(anyhow::anyhow!("host cannot be empty"));
        }

        if self.join_options.join_timeout == Duration::ZERO {
            return Err(anyhow::anyhow!("join_timeout must be at least 1 second"));
        }

        Ok(())
    }
}
