use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::registry::types::{CellState, NodeId};

/// A versioned copy of a cell's state.
///
/// Used for the local `SelfState` and for the last state a peer claimed about
/// itself. `version` increases by one on every local update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StateSnapshot {
    pub level: f64,
    #[serde(default)]
    pub context: BTreeMap<String, f64>,
    pub version: u64,
}

impl StateSnapshot {
    /// The state a cell starts from, before any update has been applied.
    pub fn initial(declared: &CellState) -> Self {
        Self {
            level: declared.level,
            context: declared.context.clone(),
            version: 0,
        }
    }

    pub fn cell_state(&self) -> CellState {
        CellState {
            level: self.level,
            context: self.context.clone(),
        }
    }
}

/// A change to apply to the local state. Components missing from `context`
/// are left untouched; unknown components are created at `0.0` first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StateDelta {
    #[serde(default)]
    pub level: f64,
    #[serde(default)]
    pub context: BTreeMap<String, f64>,
}

/// The unit exchanged by push and pull sync.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncEnvelope {
    pub sender_id: NodeId,
    pub state: CellState,
    pub version: u64,
}

impl SyncEnvelope {
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            level: self.state.level,
            context: self.state.context.clone(),
            version: self.version,
        }
    }
}

/// Result of offering a peer's state to the peer table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The envelope was newer and replaced the stored state.
    Applied { version: u64 },
    /// The envelope was not newer than what is already known; nothing changed.
    Stale { known: u64 },
}

impl MergeOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, MergeOutcome::Applied { .. })
    }

    /// Highest version known for the peer after the merge.
    pub fn known_version(&self) -> u64 {
        match *self {
            MergeOutcome::Applied { version } => version,
            MergeOutcome::Stale { known } => known,
        }
    }
}

/// Mean state over a set of peers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeerAggregate {
    pub peer_count: usize,
    pub level: f64,
    pub context: BTreeMap<String, f64>,
}

/// When the background loop pushes, pulls, both or stays idle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Push,
    Pull,
    Both,
    Off,
}

impl std::str::FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "push" => Ok(SyncMode::Push),
            "pull" => Ok(SyncMode::Pull),
            "both" => Ok(SyncMode::Both),
            "off" => Ok(SyncMode::Off),
            other => Err(format!("unknown sync mode `{}`", other)),
        }
    }
}

impl SyncMode {
    pub fn pushes(&self) -> bool {
        matches!(self, SyncMode::Push | SyncMode::Both)
    }

    pub fn pulls(&self) -> bool {
        matches!(self, SyncMode::Pull | SyncMode::Both)
    }
}
