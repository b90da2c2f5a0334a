//! Node configuration.
//!
//! Read from a TOML file, then overridden field by field from `CELL_*`
//! environment variables:
//!
//! ```toml
//! shutdown_grace_ms = 10000
//!
//! [node]
//! id = "alpha"
//! registry = "hosts.toml"
//! bind = "0.0.0.0:9000"
//!
//! [probe]
//! interval_ms = 30000
//! timeout_ms = 5000
//!
//! [sync]
//! mode = "push"
//! ```
//!
//! `node.advertised_address` and `node.role` default to the registry entry for
//! `node.id`; `node.bind` defaults to all interfaces on the advertised port.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::membership::prober::ProbeConfig;
use crate::registry::hosts::{HostRegistry, is_host_port};
use crate::registry::types::{CellState, NodeId, NodeIdentity, Role};
use crate::sync::synchronizer::SyncConfig;
use crate::sync::types::SyncMode;

pub const ENV_CONFIG: &str = "CELL_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub probe: ProbeSection,
    pub sync: SyncSection,
    pub shutdown_grace_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSection::default(),
            probe: ProbeSection::default(),
            sync: SyncSection::default(),
            shutdown_grace_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub id: String,
    pub registry: PathBuf,
    pub advertised_address: Option<String>,
    pub role: Option<Role>,
    pub bind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeSection {
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub jitter_ms: u64,
    pub max_in_flight: usize,
}

impl Default for ProbeSection {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            timeout_ms: 5_000,
            jitter_ms: 3_000,
            max_in_flight: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub jitter_ms: u64,
    pub max_in_flight: usize,
    pub max_delta: f64,
    pub mode: SyncMode,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            timeout_ms: 5_000,
            jitter_ms: 3_000,
            max_in_flight: 8,
            max_delta: 1.0,
            mode: SyncMode::Push,
        }
    }
}

impl NodeConfig {
    /// Loads the file at `path` (defaults when `None`), applies the process
    /// environment on top and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            what: "node config".to_string(),
            message: e.to_string(),
        })
    }

    /// Applies `CELL_*` overrides. `lookup` is `std::env::var` in production.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(id) = lookup("CELL_ID") {
            self.node.id = id;
        }
        if let Some(address) = lookup("CELL_ADVERTISED_ADDRESS") {
            self.node.advertised_address = Some(address);
        }
        if let Some(role) = lookup("CELL_ROLE") {
            let role = role
                .parse::<Role>()
                .map_err(|reason| ConfigError::InvalidValue {
                    field: "CELL_ROLE",
                    reason,
                })?;
            self.node.role = Some(role);
        }
        if let Some(bind) = lookup("CELL_BIND") {
            self.node.bind = Some(bind);
        }
        if let Some(registry) = lookup("CELL_REGISTRY") {
            self.node.registry = PathBuf::from(registry);
        }
        if let Some(value) = lookup("CELL_PROBE_INTERVAL_MS") {
            self.probe.interval_ms = parse_ms("CELL_PROBE_INTERVAL_MS", &value)?;
        }
        if let Some(value) = lookup("CELL_PROBE_TIMEOUT_MS") {
            self.probe.timeout_ms = parse_ms("CELL_PROBE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("CELL_SYNC_INTERVAL_MS") {
            self.sync.interval_ms = parse_ms("CELL_SYNC_INTERVAL_MS", &value)?;
        }
        if let Some(mode) = lookup("CELL_SYNC_MODE") {
            self.sync.mode = mode
                .parse::<SyncMode>()
                .map_err(|reason| ConfigError::InvalidValue {
                    field: "CELL_SYNC_MODE",
                    reason,
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.id.trim().is_empty() {
            return Err(invalid("node.id", "must not be empty"));
        }
        if self.node.registry.as_os_str().is_empty() {
            return Err(invalid("node.registry", "must point at a registry file"));
        }
        if let Some(address) = &self.node.advertised_address {
            if !is_host_port(address) {
                return Err(ConfigError::InvalidAddress {
                    id: self.node.id.clone(),
                    address: address.clone(),
                });
            }
        }
        if let Some(bind) = &self.node.bind {
            bind.parse::<SocketAddr>()
                .map_err(|e| invalid("node.bind", &e.to_string()))?;
        }

        if self.probe.interval_ms == 0 {
            return Err(invalid("probe.interval_ms", "must be positive"));
        }
        if self.probe.timeout_ms == 0 {
            return Err(invalid("probe.timeout_ms", "must be positive"));
        }
        if self.probe.max_in_flight == 0 {
            return Err(invalid("probe.max_in_flight", "must be positive"));
        }
        if self.sync.interval_ms == 0 {
            return Err(invalid("sync.interval_ms", "must be positive"));
        }
        if self.sync.timeout_ms == 0 {
            return Err(invalid("sync.timeout_ms", "must be positive"));
        }
        if self.sync.max_in_flight == 0 {
            return Err(invalid("sync.max_in_flight", "must be positive"));
        }
        if !self.sync.max_delta.is_finite() || self.sync.max_delta <= 0.0 {
            return Err(invalid("sync.max_delta", "must be a positive number"));
        }
        Ok(())
    }

    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.node.id.trim())
    }

    /// The local identity: the registry entry for `node.id`, with the address
    /// and role overridden when configured. A node missing from the registry
    /// must configure its advertised address.
    pub fn local_identity(&self, registry: &HostRegistry) -> Result<NodeIdentity, ConfigError> {
        let id = self.node_id();
        let mut identity = match registry.get(&id) {
            Some(declared) => declared.clone(),
            None => {
                let address = self.node.advertised_address.clone().ok_or_else(|| {
                    invalid(
                        "node.advertised_address",
                        &format!("`{}` is not in the registry and has no address", id),
                    )
                })?;
                NodeIdentity {
                    id,
                    advertised_address: address,
                    role: Role::default(),
                    declared_initial_state: CellState::default(),
                }
            }
        };

        if let Some(address) = &self.node.advertised_address {
            identity.advertised_address = address.clone();
        }
        if let Some(role) = self.node.role {
            identity.role = role;
        }
        Ok(identity)
    }

    /// `node.bind`, or `0.0.0.0` on the advertised port.
    pub fn bind_addr(&self, identity: &NodeIdentity) -> Result<SocketAddr, ConfigError> {
        let bind = match &self.node.bind {
            Some(bind) => bind.clone(),
            None => {
                let port = identity
                    .advertised_address
                    .rsplit_once(':')
                    .map(|(_, port)| port)
                    .unwrap_or_default();
                format!("0.0.0.0:{}", port)
            }
        };
        bind.parse()
            .map_err(|e: std::net::AddrParseError| invalid("node.bind", &e.to_string()))
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            interval: Duration::from_millis(self.probe.interval_ms),
            jitter: Duration::from_millis(self.probe.jitter_ms),
            timeout: Duration::from_millis(self.probe.timeout_ms),
            max_in_flight: self.probe.max_in_flight,
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval: Duration::from_millis(self.sync.interval_ms),
            jitter: Duration::from_millis(self.sync.jitter_ms),
            timeout: Duration::from_millis(self.sync.timeout_ms),
            max_in_flight: self.sync.max_in_flight,
            max_delta: self.sync.max_delta,
            mode: self.sync.mode,
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn parse_ms(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| invalid(field, &e.to_string()))
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}
