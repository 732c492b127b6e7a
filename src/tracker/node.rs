//! Peer Nodes
//!
//! Metadata for a single tracked peer and its position in a volume tree.
//! Links between nodes are arena indices owned by the enclosing tree.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Peer ID
// =============================================================================

/// Unique identifier for a peer within one volume
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random peer ID
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<&String> for PeerId {
    fn from(s: &String) -> Self {
        Self(s.clone())
    }
}

// =============================================================================
// Peer Status
// =============================================================================

/// Attachment status of a peer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PeerStatus {
    /// Confirmed; may serve as an intermediary
    Ok,
    /// Provisional placeholder awaiting confirmation
    Pending,
    /// Caller-defined status
    Other(String),
}

impl PeerStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PeerStatus::Ok => "OK",
            PeerStatus::Pending => "pending",
            PeerStatus::Other(s) => s,
        }
    }
}

impl std::fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for PeerStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "OK" => PeerStatus::Ok,
            "pending" => PeerStatus::Pending,
            _ => PeerStatus::Other(s),
        }
    }
}

impl From<&str> for PeerStatus {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<PeerStatus> for String {
    fn from(status: PeerStatus) -> Self {
        match status {
            PeerStatus::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

// =============================================================================
// Peer Attributes
// =============================================================================

/// Optional peer fields supplied by callers.
///
/// On update, a present field overwrites the stored value and an absent
/// field keeps it. On creation, absent fields stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAttributes {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub iqn: Option<String>,
    #[serde(default)]
    pub lun: Option<u32>,
    #[serde(default)]
    pub status: Option<PeerStatus>,
}

impl PeerAttributes {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_iqn(mut self, iqn: impl Into<String>) -> Self {
        self.iqn = Some(iqn.into());
        self
    }

    pub fn with_lun(mut self, lun: u32) -> Self {
        self.lun = Some(lun);
        self
    }

    pub fn with_status(mut self, status: PeerStatus) -> Self {
        self.status = Some(status);
        self
    }
}

// =============================================================================
// Identity Records
// =============================================================================

/// Externally visible view of a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIdentity {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub iqn: Option<String>,
    pub lun: Option<u32>,
    pub status: Option<PeerStatus>,
    pub peer_id: PeerId,
}

/// Peer identity without its ID, as listed in a volume detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerDetail {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub iqn: Option<String>,
    pub lun: Option<u32>,
    pub status: Option<PeerStatus>,
}

// =============================================================================
// Peer Node
// =============================================================================

/// Index of a node slot in a tree's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIdx(pub(crate) usize);

/// A tracked peer and its links within one volume tree
#[derive(Debug, Clone)]
pub struct PeerNode {
    pub peer_id: PeerId,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub iqn: Option<String>,
    pub lun: Option<u32>,
    pub status: Option<PeerStatus>,
    /// Synthetic sentinel root of an otherwise empty tree
    pub fake_root: bool,
    pub attached_at: DateTime<Utc>,
    pub(crate) parent: Option<NodeIdx>,
    pub(crate) left: Option<NodeIdx>,
    pub(crate) right: Option<NodeIdx>,
}

impl PeerNode {
    /// Create a detached node with no metadata
    pub fn new(peer_id: impl Into<PeerId>) -> Self {
        Self {
            peer_id: peer_id.into(),
            host: None,
            port: None,
            iqn: None,
            lun: None,
            status: None,
            fake_root: false,
            attached_at: Utc::now(),
            parent: None,
            left: None,
            right: None,
        }
    }

    /// Create a detached node populated from caller attributes
    pub fn with_attributes(peer_id: impl Into<PeerId>, attrs: PeerAttributes) -> Self {
        let mut node = Self::new(peer_id);
        node.apply(attrs);
        node
    }

    /// Sentinel root for an empty tree. Its placeholder host is random so it
    /// can never collide with a real peer.
    pub(crate) fn sentinel() -> Self {
        let mut node = Self::new(PeerId::generate());
        node.host = Some(uuid::Uuid::new_v4().to_string());
        node.status = Some(PeerStatus::Ok);
        node.fake_root = true;
        node
    }

    /// Overwrite every present attribute
    pub fn apply(&mut self, attrs: PeerAttributes) {
        if let Some(host) = attrs.host {
            self.host = Some(host);
        }
        if let Some(port) = attrs.port {
            self.port = Some(port);
        }
        if let Some(iqn) = attrs.iqn {
            self.iqn = Some(iqn);
        }
        if let Some(lun) = attrs.lun {
            self.lun = Some(lun);
        }
        if let Some(status) = attrs.status {
            self.status = Some(status);
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Some(PeerStatus::Ok)
    }

    pub fn is_pending(&self) -> bool {
        self.status == Some(PeerStatus::Pending)
    }

    #[inline]
    pub fn has_free_slot(&self) -> bool {
        self.left.is_none() || self.right.is_none()
    }

    /// True if a new peer may attach beneath this one
    #[inline]
    pub fn available(&self) -> bool {
        self.is_ok() && self.has_free_slot()
    }

    pub fn has_parent(&self) -> bool {
        self.parent.is_some()
    }

    pub fn has_children(&self) -> bool {
        self.left.is_some() || self.right.is_some()
    }

    pub fn identity(&self) -> PeerIdentity {
        PeerIdentity {
            host: self.host.clone(),
            port: self.port,
            iqn: self.iqn.clone(),
            lun: self.lun,
            status: self.status.clone(),
            peer_id: self.peer_id.clone(),
        }
    }

    pub fn detail(&self) -> PeerDetail {
        PeerDetail {
            host: self.host.clone(),
            port: self.port,
            iqn: self.iqn.clone(),
            lun: self.lun,
            status: self.status.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_requires_ok_and_free_slot() {
        let mut node = PeerNode::new("p1");
        assert!(!node.available());

        node.status = Some(PeerStatus::Pending);
        assert!(!node.available());

        node.status = Some(PeerStatus::Ok);
        assert!(node.available());
        assert!(!node.has_children());

        node.left = Some(NodeIdx(1));
        assert!(node.available());
        assert!(node.has_children());

        node.right = Some(NodeIdx(2));
        assert!(!node.available());
    }

    #[test]
    fn test_apply_keeps_absent_fields() {
        let mut node = PeerNode::with_attributes(
            "p1",
            PeerAttributes::default()
                .with_host("h1")
                .with_port(3260)
                .with_iqn("iqn.x"),
        );

        node.apply(PeerAttributes::default().with_lun(7).with_status(PeerStatus::Ok));

        assert_eq!(node.host.as_deref(), Some("h1"));
        assert_eq!(node.port, Some(3260));
        assert_eq!(node.iqn.as_deref(), Some("iqn.x"));
        assert_eq!(node.lun, Some(7));
        assert!(node.is_ok());
    }

    #[test]
    fn test_identity_wire_shape() {
        let node = PeerNode::with_attributes(
            "p1",
            PeerAttributes::default()
                .with_host("h1")
                .with_port(3260)
                .with_iqn("iqn.x")
                .with_lun(0)
                .with_status(PeerStatus::Ok),
        );

        let value = serde_json::to_value(node.identity()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "host": "h1",
                "port": 3260,
                "iqn": "iqn.x",
                "lun": 0,
                "status": "OK",
                "peer_id": "p1",
            })
        );

        let detail = serde_json::to_value(node.detail()).unwrap();
        assert!(detail.get("peer_id").is_none());
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(PeerStatus::from("OK"), PeerStatus::Ok);
        assert_eq!(PeerStatus::from("pending"), PeerStatus::Pending);
        assert_eq!(PeerStatus::from("draining"), PeerStatus::Other("draining".into()));
        assert_eq!(String::from(PeerStatus::Pending), "pending");

        let parsed: PeerStatus = serde_json::from_str("\"OK\"").unwrap();
        assert_eq!(parsed, PeerStatus::Ok);
    }

    #[test]
    fn test_sentinel_is_ok_fake_root() {
        let sentinel = PeerNode::sentinel();
        assert!(sentinel.fake_root);
        assert!(sentinel.available());
        assert!(sentinel.host.is_some());
    }

    #[test]
    fn test_generated_peer_ids_are_unique() {
        assert_ne!(PeerId::generate(), PeerId::generate());
    }
}
