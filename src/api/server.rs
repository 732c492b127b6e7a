//! API Server
//!
//! Binds the REST router and serves it until shutdown is triggered.

use crate::domain::ports::TopologyExecutor;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

use super::rest::{RestRouter, DEFAULT_MAX_BODY_SIZE, DEFAULT_MAX_CONCURRENT_REQUESTS};

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
    /// Maximum in-flight requests
    pub max_concurrent_requests: usize,
    /// Max request body size
    pub max_body_size: usize,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

/// REST API server
pub struct ApiServer {
    config: ApiServerConfig,
    executor: Arc<dyn TopologyExecutor>,
    shutdown_tx: broadcast::Sender<()>,
    /// Subscribed at construction so a shutdown sent before `run` is kept
    shutdown_rx: Mutex<Option<broadcast::Receiver<()>>>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiServerConfig, executor: Arc<dyn TopologyExecutor>) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        Self {
            config,
            executor,
            shutdown_tx,
            shutdown_rx: Mutex::new(Some(shutdown_rx)),
        }
    }

    /// Run the API server
    pub async fn run(&self) -> Result<()> {
        info!("Starting API server");
        info!("  REST API: {}", self.config.rest_addr);
        info!("  Executor: {}", self.executor.name());
        info!("  Max concurrent requests: {}", self.config.max_concurrent_requests);

        let rest_handle = self.spawn_rest_server();

        match rest_handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("REST server task failed: {:?}", e);
                Err(Error::Internal(format!("REST server task failed: {}", e)))
            }
        }
    }

    /// Spawn the REST server
    fn spawn_rest_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let config = self.config.clone();
        let executor = self.executor.clone();
        let shutdown_rx = self
            .shutdown_rx
            .lock()
            .take()
            .unwrap_or_else(|| self.shutdown_tx.subscribe());

        tokio::spawn(async move { run_rest_server(config, executor, shutdown_rx).await })
    }

    /// Get a handle that can trigger graceful shutdown
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Run the REST API server
async fn run_rest_server(
    config: ApiServerConfig,
    executor: Arc<dyn TopologyExecutor>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let app = RestRouter::new(executor)
        .with_limits(config.max_concurrent_requests, config.max_body_size)
        .build();

    let listener = tokio::net::TcpListener::bind(config.rest_addr).await?;

    info!("REST API listening on {}", config.rest_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("REST server shutting down");
        })
        .await?;

    Ok(())
}
