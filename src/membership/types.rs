use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProbeError;
use crate::registry::types::NodeIdentity;
use crate::sync::types::StateSnapshot;

/// How a peer first became known, or was most recently confirmed by a probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveredVia {
    ActiveProbe,
    InboundRegistration,
}

/// What the local node knows about one peer.
///
/// Owned exclusively by the [`PeerTable`](super::table::PeerTable); callers only
/// ever see clones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    pub identity: NodeIdentity,
    /// Milliseconds since the Unix epoch of the last successful contact.
    /// Never decreases for a given peer.
    pub last_seen_at: u64,
    pub last_known_state: StateSnapshot,
    pub reachable: bool,
    pub discovered_via: DiscoveredVia,
}

/// Why a probe classified a peer as unreachable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", tag = "reason", content = "detail")]
pub enum UnreachableReason {
    Timeout,
    Refused,
    BadStatus(u16),
    Transport(String),
}

impl From<ProbeError> for UnreachableReason {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::Timeout => UnreachableReason::Timeout,
            ProbeError::Refused => UnreachableReason::Refused,
            ProbeError::Status(code) => UnreachableReason::BadStatus(code),
            other => UnreachableReason::Transport(other.to_string()),
        }
    }
}

impl fmt::Display for UnreachableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnreachableReason::Timeout => f.write_str("timeout"),
            UnreachableReason::Refused => f.write_str("refused"),
            UnreachableReason::BadStatus(code) => write!(f, "status {}", code),
            UnreachableReason::Transport(msg) => write!(f, "transport: {}", msg),
        }
    }
}

/// Result of a single liveness check.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Reachable,
    Unreachable(UnreachableReason),
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable)
    }
}

/// Result of writing a contact into the peer table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First contact with this peer id.
    Created,
    /// Record replaced, including the state.
    Replaced,
    /// Contact recorded but the offered state was older than the stored one.
    Refreshed,
}

/// Helper to get the current wall-clock time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
