//! Topology Events
//!
//! Events emitted by the volume registry so in-process consumers can react
//! to peers joining, leaving and being confirmed.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events emitted by the volume registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TopologyEvent {
    /// A tree was created for a volume on first reference
    VolumeCreated { volume_id: String },

    /// A peer was attached; `parent` is `None` for a direct attachment
    PeerAttached {
        volume_id: String,
        peer_id: String,
        parent: Option<String>,
        attached_at: DateTime<Utc>,
    },

    /// A peer's metadata was confirmed
    PeerConfirmed { volume_id: String, peer_id: String },

    /// A peer was removed
    PeerDetached { volume_id: String, peer_id: String },

    /// Descendants of a pending peer were torn down
    SubtreePruned {
        volume_id: String,
        root_peer_id: String,
        pruned: Vec<String>,
    },
}

impl TopologyEvent {
    /// Get the volume ID associated with this event
    pub fn volume_id(&self) -> &str {
        match self {
            TopologyEvent::VolumeCreated { volume_id } => volume_id,
            TopologyEvent::PeerAttached { volume_id, .. } => volume_id,
            TopologyEvent::PeerConfirmed { volume_id, .. } => volume_id,
            TopologyEvent::PeerDetached { volume_id, .. } => volume_id,
            TopologyEvent::SubtreePruned { volume_id, .. } => volume_id,
        }
    }

    /// Get the peer ID if this is a peer-level event
    pub fn peer_id(&self) -> Option<&str> {
        match self {
            TopologyEvent::PeerAttached { peer_id, .. } => Some(peer_id),
            TopologyEvent::PeerConfirmed { peer_id, .. } => Some(peer_id),
            TopologyEvent::PeerDetached { peer_id, .. } => Some(peer_id),
            TopologyEvent::SubtreePruned { root_peer_id, .. } => Some(root_peer_id),
            TopologyEvent::VolumeCreated { .. } => None,
        }
    }

    /// Serialize the event as a tagged JSON object
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check if this event changed the shape of a tree
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            TopologyEvent::PeerAttached { .. }
                | TopologyEvent::PeerDetached { .. }
                | TopologyEvent::SubtreePruned { .. }
        )
    }
}
