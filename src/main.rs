//! Volume Tracker
//!
//! Serves the peer attachment topology of every tracked volume over REST.

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use volume_tracker::{ApiServer, ApiServerConfig, ExecutorFactory, TrackerConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Volume Tracker - peer attachment topology service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8090")]
    api_addr: String,

    /// Topology executor to load
    #[arg(long, env = "EXECUTOR", default_value = "btree")]
    executor: String,

    /// Maximum number of in-flight requests
    #[arg(long, env = "MAX_CONCURRENT_REQUESTS", default_value = "1024")]
    max_concurrent_requests: usize,

    /// Maximum request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "65536")]
    max_body_bytes: usize,

    /// Capacity of the topology event channel
    #[arg(long, env = "EVENT_CAPACITY", default_value = "1024")]
    event_capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Starting Volume Tracker");
    info!("  Version: {}", volume_tracker::VERSION);
    info!("  REST API: {}", args.api_addr);
    info!("  Executor: {}", args.executor);

    let tracker_config = TrackerConfig {
        executor: args.executor.clone(),
        event_capacity: args.event_capacity,
    };
    let executor = ExecutorFactory::create(&tracker_config)
        .with_context(|| format!("failed to load executor {}", args.executor))?;

    // Log topology changes
    let mut events = executor.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match event.to_json() {
                    Ok(json) if event.is_structural() => {
                        debug!(volume_id = event.volume_id(), event = %json, "Topology changed")
                    }
                    Ok(json) => trace!(volume_id = event.volume_id(), event = %json, "Topology event"),
                    Err(e) => warn!("Failed to encode topology event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Topology event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let api_config = ApiServerConfig {
        rest_addr: args
            .api_addr
            .parse()
            .with_context(|| format!("invalid REST API address: {}", args.api_addr))?,
        max_concurrent_requests: args.max_concurrent_requests,
        max_body_size: args.max_body_bytes,
    };

    let api_server = ApiServer::new(api_config, executor);

    let shutdown = api_server.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received interrupt, shutting down");
            let _ = shutdown.send(());
        }
    });

    api_server.run().await?;

    info!("Volume Tracker shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("tower=warn".parse()?)
        .add_directive("tower_http=info".parse()?)
        .add_directive("axum=info".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }

    Ok(())
}
