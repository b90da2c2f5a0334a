//! Sync Network Protocol
//!
//! `POST /sync` pushes a sender's envelope to us; `GET /sync` returns ours so a
//! peer can pull it. `POST /state/delta` is the local trigger for
//! `apply_local_delta`.

use serde::{Deserialize, Serialize};

use super::types::{StateSnapshot, SyncEnvelope};
use crate::error::EnvelopeError;
use crate::registration::protocol::WireState;
use crate::registry::types::{CellState, NodeId};

/// Push (POST) or pull (GET) a sync envelope.
pub const ENDPOINT_SYNC: &str = "/sync";
/// Apply a local delta to this node's own state.
pub const ENDPOINT_STATE_DELTA: &str = "/state/delta";

/// Body of `POST /sync`: `{senderId, state: {level, context}, version}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<WireState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl SyncRequest {
    pub fn into_envelope(self) -> Result<SyncEnvelope, EnvelopeError> {
        let sender_id = self
            .sender_id
            .filter(|id| !id.0.trim().is_empty())
            .ok_or(EnvelopeError::MissingField("senderId"))?;
        let version = self.version.ok_or(EnvelopeError::MissingField("version"))?;
        let state = self.state.ok_or(EnvelopeError::MissingField("state"))?;
        let snapshot = state.into_snapshot(false)?;

        Ok(SyncEnvelope {
            sender_id,
            state: CellState {
                level: snapshot.level,
                context: snapshot.context,
            },
            version,
        })
    }
}

impl From<&SyncEnvelope> for SyncRequest {
    fn from(envelope: &SyncEnvelope) -> Self {
        Self {
            sender_id: Some(envelope.sender_id.clone()),
            state: Some(WireState {
                level: Some(envelope.state.level),
                context: Some(envelope.state.context.clone()),
                version: None,
            }),
            version: Some(envelope.version),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub accepted: bool,
    /// Highest version of the sender's state known after the merge.
    pub current_version_known: u64,
}

/// Reply to `POST /state/delta`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeltaResponse {
    pub self_state: StateSnapshot,
}
