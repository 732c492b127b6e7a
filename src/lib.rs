//! Volume Tracker - Peer Attachment Topology Service
//!
//! Tracks, per volume, which peers attach directly to the volume's origin
//! and which attach through another peer. Each volume gets a bounded fan-out
//! binary tree so no single peer serves more than two others.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                     REST API (axum)                        │
//! │      /v1/volumes   /v1/hosts   /health   /metrics          │
//! ├────────────────────────────────────────────────────────────┤
//! │               TopologyExecutor ("btree")                   │
//! ├────────────────────────────────────────────────────────────┤
//! │                    Volume Registry                         │
//! │  ┌────────────────────────┐   ┌─────────────────────────┐  │
//! │  │ volume -> VolumeTree   │   │ host -> peer -> volume  │  │
//! │  │ (one RwLock per tree)  │   │ (sharded host index)    │  │
//! │  └────────────────────────┘   └─────────────────────────┘  │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`tracker`]: Peer nodes, volume trees and the registry
//! - [`api`]: REST API server
//! - [`domain`]: Executor port and boundary records
//! - [`metrics`]: Prometheus rendering of registry statistics
//! - [`error`]: Error types and handling

pub mod api;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod tracker;

// Re-export commonly used types
pub use api::{ApiServer, ApiServerConfig, RestRouter};

pub use domain::ports::{ParentsResponse, TopologyExecutor, VolumeSummary};

pub use error::{Error, Result};

pub use tracker::{
    ExecutorFactory, PeerAttributes, PeerDetail, PeerId, PeerIdentity, PeerNode, PeerStatus,
    RegistryStatsSnapshot, TopologyEvent, TrackerConfig, VolumeRegistry, VolumeTree,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
