use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::membership::types::{DiscoveredVia, PeerRecord};
use crate::registry::types::{NodeId, Role};
use crate::sync::types::{PeerAggregate, StateSnapshot};

pub const ENDPOINT_HEALTH: &str = "/health";
pub const ENDPOINT_PEERS: &str = "/peers";
/// A single peer record, for operator eviction.
pub const ENDPOINT_PEER: &str = "/peers/:id";
pub const ENDPOINT_STATUS: &str = "/status";

pub const STATUS_HEALTHY: &str = "healthy";
pub const STATUS_ISOLATED: &str = "isolated";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub self_id: NodeId,
    pub role: Role,
    pub level: f64,
    pub version: u64,
    pub reachable_peer_count: usize,
}

/// One row of `/peers`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeerView {
    pub id: NodeId,
    pub address: String,
    pub role: Role,
    pub level: f64,
    pub context: BTreeMap<String, f64>,
    pub version: u64,
    pub last_seen_at: u64,
    pub reachable: bool,
    pub discovered_via: DiscoveredVia,
}

impl From<PeerRecord> for PeerView {
    fn from(record: PeerRecord) -> Self {
        Self {
            id: record.identity.id,
            address: record.identity.advertised_address,
            role: record.identity.role,
            level: record.last_known_state.level,
            context: record.last_known_state.context,
            version: record.last_known_state.version,
            last_seen_at: record.last_seen_at,
            reachable: record.reachable,
            discovered_via: record.discovered_via,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeersResponse {
    pub peers: Vec<PeerView>,
    pub count: usize,
    pub self_id: NodeId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelfView {
    pub id: NodeId,
    pub address: String,
    pub role: Role,
    pub state: StateSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(rename = "self")]
    pub self_view: SelfView,
    pub peers: Vec<PeerView>,
    pub count: usize,
    pub reachable_peer_count: usize,
    pub stale_updates: u64,
    pub aggregate: Option<PeerAggregate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemovePeerResponse {
    pub removed: NodeId,
}
