//! Tracker Module
//!
//! Per-volume attachment trees, the registry holding them, and the factory
//! that selects a topology executor by name.

pub mod events;
pub mod node;
pub mod registry;
pub mod tree;

pub use events::*;
pub use node::*;
pub use registry::*;
pub use tree::*;

use crate::domain::ports::TopologyExecutor;
use crate::error::{Error, Result};
use std::sync::Arc;

/// Name of the built-in binary tree executor
pub const BTREE_EXECUTOR: &str = "btree";

/// Tracker configuration
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Executor to load
    pub executor: String,
    /// Capacity of the topology event channel
    pub event_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            executor: BTREE_EXECUTOR.to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Factory for creating topology executors
pub struct ExecutorFactory;

impl ExecutorFactory {
    /// Create an executor by name
    pub fn create(config: &TrackerConfig) -> Result<Arc<dyn TopologyExecutor>> {
        match config.executor.to_lowercase().as_str() {
            BTREE_EXECUTOR => Ok(VolumeRegistry::with_event_capacity(config.event_capacity)),
            other => Err(Error::Configuration(format!(
                "unknown topology executor: {}",
                other
            ))),
        }
    }

    /// Names of the executors this build can create
    pub fn available() -> &'static [&'static str] {
        &[BTREE_EXECUTOR]
    }
}
