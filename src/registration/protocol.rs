//! Registration Network Protocol
//!
//! DTOs for the `/register` handshake. Inbound fields are optional on the wire
//! so that a missing one is reported as a malformed envelope (400) rather than
//! an extractor rejection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::EnvelopeError;
use crate::registry::types::{NodeId, Role};
use crate::sync::types::StateSnapshot;

/// Offer the caller's identity and state to be registered by the callee.
pub const ENDPOINT_REGISTER: &str = "/register";

/// A state as carried on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WireState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl WireState {
    /// Validates the payload. `version` is required only when `require_version`
    /// is set; otherwise it defaults to `0`.
    pub fn into_snapshot(self, require_version: bool) -> Result<StateSnapshot, EnvelopeError> {
        let level = self.level.ok_or(EnvelopeError::MissingField("level"))?;
        if !level.is_finite() {
            return Err(EnvelopeError::InvalidValue {
                field: "level",
                reason: "must be a finite number".to_string(),
            });
        }

        let context = self.context.unwrap_or_default();
        if let Some((name, _)) = context.iter().find(|(_, v)| !v.is_finite()) {
            return Err(EnvelopeError::InvalidValue {
                field: "context",
                reason: format!("component `{}` must be a finite number", name),
            });
        }

        let version = match self.version {
            Some(version) => version,
            None if require_version => return Err(EnvelopeError::MissingField("version")),
            None => 0,
        };

        Ok(StateSnapshot {
            level,
            context,
            version,
        })
    }
}

impl From<&StateSnapshot> for WireState {
    fn from(state: &StateSnapshot) -> Self {
        Self {
            level: Some(state.level),
            context: Some(state.context.clone()),
            version: Some(state.version),
        }
    }
}

/// Body of `POST /register`: `{id, address, role?, declaredState}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_state: Option<WireState>,
}

/// Reply to a registration: the callee's own identity and current state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub id: NodeId,
    pub address: String,
    #[serde(default)]
    pub role: Role,
    pub self_state: StateSnapshot,
}
