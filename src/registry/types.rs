use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a cell, unique within the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Declared role of a cell.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Mobile,
    #[default]
    Ephemeral,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(Role::Primary),
            "mobile" => Ok(Role::Mobile),
            "ephemeral" => Ok(Role::Ephemeral),
            other => Err(format!("unknown role `{}`", other)),
        }
    }
}

/// A level plus its named context components (stability, activity, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CellState {
    pub level: f64,
    #[serde(default)]
    pub context: BTreeMap<String, f64>,
}

impl CellState {
    pub fn new(level: f64) -> Self {
        Self {
            level,
            context: BTreeMap::new(),
        }
    }
}

/// Immutable identity of a cell, as declared in the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeIdentity {
    pub id: NodeId,
    /// `host:port` the cell can be reached on.
    pub advertised_address: String,
    pub role: Role,
    pub declared_initial_state: CellState,
}

impl NodeIdentity {
    /// Identity known only by id, for a peer that contacted us without being
    /// declared in the registry.
    pub fn minimal(id: NodeId) -> Self {
        Self {
            id,
            advertised_address: String::new(),
            role: Role::Ephemeral,
            declared_initial_state: CellState::default(),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.advertised_address)
    }
}
