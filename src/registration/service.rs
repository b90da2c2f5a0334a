use std::sync::Arc;
use std::time::Duration;

use super::protocol::{RegisterRequest, RegisterResponse, WireState};
use crate::error::{EnvelopeError, ProbeError};
use crate::membership::prober::bounded;
use crate::membership::table::PeerTable;
use crate::membership::types::{DiscoveredVia, UpsertOutcome, now_ms};
use crate::registry::hosts::{HostRegistry, is_host_port};
use crate::registry::types::{CellState, NodeIdentity};
use crate::sync::synchronizer::StateSynchronizer;
use crate::transport::PeerClient;

/// Both halves of the registration handshake.
pub struct RegistrationService {
    local: NodeIdentity,
    registry: Arc<HostRegistry>,
    table: Arc<PeerTable>,
    sync: Arc<StateSynchronizer>,
    client: Arc<dyn PeerClient>,
    timeout: Duration,
}

impl RegistrationService {
    pub fn new(
        local: NodeIdentity,
        registry: Arc<HostRegistry>,
        table: Arc<PeerTable>,
        sync: Arc<StateSynchronizer>,
        client: Arc<dyn PeerClient>,
        timeout: Duration,
    ) -> Self {
        Self {
            local,
            registry,
            table,
            sync,
            client,
            timeout,
        }
    }

    /// The request we send to a peer we just reached.
    pub async fn outbound_request(&self) -> RegisterRequest {
        let state = self.sync.snapshot().await;
        RegisterRequest {
            id: Some(self.local.id.clone()),
            address: Some(self.local.advertised_address.clone()),
            role: Some(self.local.role),
            declared_state: Some(WireState::from(&state)),
        }
    }

    /// Outbound half: register with `peer` and record its echoed identity and
    /// state as an active-probe contact.
    pub async fn register_with(&self, peer: &NodeIdentity) -> Result<UpsertOutcome, ProbeError> {
        let request = self.outbound_request().await;
        let response = bounded(
            self.timeout,
            self.client.register(peer, &request, self.timeout),
        )
        .await?;

        if response.id != peer.id {
            return Err(ProbeError::IdentityMismatch {
                expected: peer.id.0.clone(),
                actual: response.id.0,
            });
        }

        // Keep the address we actually reached; the peer may advertise an
        // internal one.
        let identity = NodeIdentity {
            id: peer.id.clone(),
            advertised_address: peer.advertised_address.clone(),
            role: response.role,
            declared_initial_state: peer.declared_initial_state.clone(),
        };

        let outcome =
            self.table
                .record_contact(identity, response.self_state, DiscoveredVia::ActiveProbe, now_ms());
        tracing::debug!("Registered with {} ({:?})", peer.id, outcome);
        Ok(outcome)
    }

    /// Inbound half: validate, record the caller, echo our identity and state.
    ///
    /// A malformed request mutates nothing.
    pub async fn accept(&self, request: RegisterRequest) -> Result<RegisterResponse, EnvelopeError> {
        let id = request
            .id
            .filter(|id| !id.0.trim().is_empty())
            .ok_or(EnvelopeError::MissingField("id"))?;
        if id == self.local.id {
            return Err(EnvelopeError::SelfAddressed(id.0));
        }

        let address = request
            .address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .ok_or(EnvelopeError::MissingField("address"))?;
        if !is_host_port(&address) {
            return Err(EnvelopeError::InvalidValue {
                field: "address",
                reason: format!("`{}` is not host:port", address),
            });
        }

        let state = request
            .declared_state
            .ok_or(EnvelopeError::MissingField("declaredState"))?
            .into_snapshot(false)?;

        let declared = self.registry.get(&id);
        let identity = NodeIdentity {
            role: request
                .role
                .or_else(|| declared.map(|d| d.role))
                .unwrap_or_default(),
            declared_initial_state: declared
                .map(|d| d.declared_initial_state.clone())
                .unwrap_or_else(|| CellState {
                    level: state.level,
                    context: state.context.clone(),
                }),
            id: id.clone(),
            advertised_address: address,
        };

        let outcome = self.table.record_contact(
            identity,
            state,
            DiscoveredVia::InboundRegistration,
            now_ms(),
        );
        tracing::debug!("Accepted registration from {} ({:?})", id, outcome);

        Ok(RegisterResponse {
            id: self.local.id.clone(),
            address: self.local.advertised_address.clone(),
            role: self.local.role,
            self_state: self.sync.snapshot().await,
        })
    }
}
