//! Loading and lookups for the host registry.
//!
//! The on-disk format is TOML:
//!
//! ```toml
//! [[hosts]]
//! id = "alpha"
//! address = "h1:9000"
//! role = "primary"
//! level = 5.0
//!
//! [hosts.context]
//! stability = 0.8
//! ```
//!
//! `id`, `address` and `role` are required; `level` defaults to `0.0` and
//! `context` to an empty map.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::types::{CellState, NodeId, NodeIdentity, Role};
use crate::error::ConfigError;

#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    hosts: Vec<HostEntry>,
}

/// One raw `[[hosts]]` table. Fields are optional here so that a missing one
/// is reported as [`ConfigError::MissingField`] rather than a parse error.
#[derive(Debug, Default, Deserialize)]
pub struct HostEntry {
    pub id: Option<String>,
    pub address: Option<String>,
    pub role: Option<String>,
    pub level: Option<f64>,
    #[serde(default)]
    pub context: HashMap<String, f64>,
}

/// Immutable mapping from node id to its declared identity.
#[derive(Debug, Clone)]
pub struct HostRegistry {
    hosts: BTreeMap<NodeId, NodeIdentity>,
}

impl HostRegistry {
    /// Reads and validates the registry file at `source`.
    pub fn load(source: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = source.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: RegistryFile = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            what: "host registry".to_string(),
            message: e.to_string(),
        })?;
        Self::from_entries(file.hosts)
    }

    pub fn from_entries(entries: Vec<HostEntry>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }

        let mut hosts = BTreeMap::new();
        for (index, entry) in entries.into_iter().enumerate() {
            let identity = entry.into_identity(index)?;
            if hosts.contains_key(&identity.id) {
                return Err(ConfigError::DuplicateId(identity.id.0));
            }
            hosts.insert(identity.id.clone(), identity);
        }

        tracing::debug!("Loaded host registry with {} entries", hosts.len());
        Ok(Self { hosts })
    }

    pub fn get(&self, id: &NodeId) -> Option<&NodeIdentity> {
        self.hosts.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.hosts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Every registered host except `self_id`, in id order.
    pub fn peers_of<'a>(&'a self, self_id: &'a NodeId) -> impl Iterator<Item = &'a NodeIdentity> {
        self.hosts.values().filter(move |identity| &identity.id != self_id)
    }
}

impl HostEntry {
    fn into_identity(self, index: usize) -> Result<NodeIdentity, ConfigError> {
        let id = non_empty(self.id).ok_or(ConfigError::MissingField { index, field: "id" })?;
        let address = non_empty(self.address).ok_or(ConfigError::MissingField {
            index,
            field: "address",
        })?;
        let role = non_empty(self.role).ok_or(ConfigError::MissingField {
            index,
            field: "role",
        })?;

        if !is_host_port(&address) {
            return Err(ConfigError::InvalidAddress { id, address });
        }

        let role: Role = role.parse().map_err(|reason| ConfigError::InvalidValue {
            field: "role",
            reason,
        })?;

        let level = self.level.unwrap_or(0.0);
        if !level.is_finite() || self.context.values().any(|v| !v.is_finite()) {
            return Err(ConfigError::InvalidValue {
                field: "level",
                reason: format!("non-finite initial state for `{}`", id),
            });
        }

        Ok(NodeIdentity {
            id: NodeId(id),
            advertised_address: address,
            role,
            declared_initial_state: CellState {
                level,
                context: self.context.into_iter().collect(),
            },
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `host:port` with a non-empty host and a valid port.
pub fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
