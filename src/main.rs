//! overlay-dht - Main entry point
//!
//! Starts a bootstrapper for a new overlay and joins nodes to it.

use anyhow::{Context, Result};
use overlay_dht::{CliArgs, Config, Node};
use tracing::{debug, error, info};

/// Set up panic handler for unexpected errors
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();

        if let Some(location) = panic_info.location() {
            error!(
                "PANIC occurred at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }
        let payload = panic_info.payload();
        if let Some(s) = payload.downcast_ref::<&str>() {
            error!("Panic message: {}", s);
        } else if let Some(s) = payload.downcast_ref::<String>() {
            error!("Panic message: {}", s);
        } else {
            error!("Panic message: unknown");
        }
        error!("Backtrace:\n{:?}", backtrace);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_panic_handler();

    let args = CliArgs::parse_args();
    init_logging(&args);
    debug!("CLI arguments: {:?}", args);

    let config = Config::from_args(&args);
    config.validate().context("Invalid configuration")?;

    if let Err(e) = run(&config).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

/// Initialize logging based on verbosity settings
fn init_logging(args: &CliArgs) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

async fn run(config: &Config) -> Result<()> {
    info!("Starting new network...");
    let bootstrapper = Node::start_network_with(config.network, config.bootstrap_options.clone())
        .await
        .context("Failed to start network")?;
    let port = bootstrapper
        .ready()
        .await
        .context("Bootstrapper failed to listen")?;
    info!("Bootstrapper {} listening on {}. Joining nodes...", bootstrapper.node_id(), port);

    let mut members = Vec::with_capacity(config.joiners);
    for _ in 0..config.joiners {
        let node = Node::join_network_with(&config.host, port, config.join_options.clone())
            .await
            .with_context(|| format!("Failed to join network via {}:{}", config.host, port))?;
        let node_port = node.ready().await.context("Joined node failed to listen")?;
        info!(
            "Node {} joined, listening on {} with {} routes",
            node.node_id(),
            node_port,
            node.routes().await.len()
        );
        members.push(node);
    }

    info!(
        "Overlay of {} nodes is up; bootstrapper knows {} routes",
        members.len() + 1,
        bootstrapper.routes().await.len()
    );

    if config.exit_after_join {
        return Ok(());
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl-C")?;
    info!("Shutting down");
    for node in &members {
        node.shutdown();
    }
    bootstrapper.shutdown();
    Ok(())
}
