//! In-process mesh for tests.
//!
//! [`FakeNetwork`] routes every `PeerClient` call straight into the callee
//! node's registration service or synchronizer, so discovery scenarios run
//! without sockets. A directed link can be blocked to simulate NAT or a
//! firewall: calls over a blocked link time out. A hung node accepts calls
//! and never answers, whatever timeout the caller passes.

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower::ServiceExt;

use crate::error::ProbeError;
use crate::membership::prober::ProbeConfig;
use crate::node::CellNode;
use crate::registration::protocol::{RegisterRequest, RegisterResponse};
use crate::registry::hosts::{HostEntry, HostRegistry};
use crate::registry::types::{CellState, NodeId, NodeIdentity, Role};
use crate::sync::protocol::{SyncRequest, SyncResponse};
use crate::sync::synchronizer::SyncConfig;
use crate::sync::types::{SyncEnvelope, SyncMode};
use crate::transport::PeerClient;

#[derive(Default)]
pub struct FakeNetwork {
    nodes: DashMap<NodeId, Arc<CellNode>>,
    blocked: DashMap<(NodeId, NodeId), ()>,
    hung: DashMap<NodeId, ()>,
    refusing_pulls: DashMap<NodeId, ()>,
    calls: AtomicUsize,
}

impl FakeNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn client_for(self: &Arc<Self>, from: &NodeId) -> Arc<dyn PeerClient> {
        Arc::new(FakeClient {
            from: from.clone(),
            net: self.clone(),
        })
    }

    pub fn attach(&self, node: Arc<CellNode>) {
        self.nodes.insert(node.identity.id.clone(), node);
    }

    /// Takes the node off the network; calls to it are refused.
    pub fn detach(&self, id: &str) {
        self.nodes.remove(&NodeId::from(id));
    }

    /// Calls from `from` to `to` time out from now on.
    pub fn block(&self, from: &str, to: &str) {
        self.blocked.insert((NodeId::from(from), NodeId::from(to)), ());
    }

    pub fn unblock(&self, from: &str, to: &str) {
        self.blocked.remove(&(NodeId::from(from), NodeId::from(to)));
    }

    /// Calls to the node never complete from now on.
    pub fn hang(&self, id: &str) {
        self.hung.insert(NodeId::from(id), ());
    }

    /// Pulls from the node answer 503; every other call still succeeds.
    pub fn refuse_pulls(&self, id: &str) {
        self.refusing_pulls.insert(NodeId::from(id), ());
    }

    /// Number of outbound calls attempted over the network so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

pub struct FakeClient {
    from: NodeId,
    net: Arc<FakeNetwork>,
}

impl FakeClient {
    async fn route(&self, peer: &NodeIdentity) -> Result<Arc<CellNode>, ProbeError> {
        self.net.calls.fetch_add(1, Ordering::Relaxed);
        if self.net.hung.contains_key(&peer.id) {
            std::future::pending::<()>().await;
        }
        if self
            .net
            .blocked
            .contains_key(&(self.from.clone(), peer.id.clone()))
        {
            return Err(ProbeError::Timeout);
        }
        self.net
            .nodes
            .get(&peer.id)
            .map(|entry| entry.value().clone())
            .ok_or(ProbeError::Refused)
    }
}

#[async_trait]
impl PeerClient for FakeClient {
    async fn probe(&self, peer: &NodeIdentity, _timeout: Duration) -> Result<(), ProbeError> {
        self.route(peer).await.map(|_| ())
    }

    async fn register(
        &self,
        peer: &NodeIdentity,
        request: &RegisterRequest,
        _timeout: Duration,
    ) -> Result<RegisterResponse, ProbeError> {
        let node = self.route(peer).await?;
        node.registration
            .accept(request.clone())
            .await
            .map_err(|e| ProbeError::Status(e.status_code().as_u16()))
    }

    async fn push_state(
        &self,
        peer: &NodeIdentity,
        envelope: &SyncEnvelope,
        _timeout: Duration,
    ) -> Result<SyncResponse, ProbeError> {
        let node = self.route(peer).await?;
        let envelope = SyncRequest::from(envelope)
            .into_envelope()
            .map_err(|e| ProbeError::Status(e.status_code().as_u16()))?;
        let outcome = node
            .sync
            .merge_remote(envelope)
            .map_err(|e| ProbeError::Status(e.status_code().as_u16()))?;
        Ok(SyncResponse {
            accepted: outcome.accepted(),
            current_version_known: outcome.known_version(),
        })
    }

    async fn pull_state(
        &self,
        peer: &NodeIdentity,
        _timeout: Duration,
    ) -> Result<SyncEnvelope, ProbeError> {
        let node = self.route(peer).await?;
        if self.net.refusing_pulls.contains_key(&peer.id) {
            return Err(ProbeError::Status(503));
        }
        Ok(node.sync.envelope().await)
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn identity(id: &str, address: &str, role: Role, level: f64) -> NodeIdentity {
    NodeIdentity {
        id: NodeId::from(id),
        advertised_address: address.to_string(),
        role,
        declared_initial_state: CellState::new(level),
    }
}

pub fn registry_of(identities: &[NodeIdentity]) -> Arc<HostRegistry> {
    let entries = identities
        .iter()
        .map(|identity| HostEntry {
            id: Some(identity.id.0.clone()),
            address: Some(identity.advertised_address.clone()),
            role: Some(
                match identity.role {
                    Role::Primary => "primary",
                    Role::Mobile => "mobile",
                    Role::Ephemeral => "ephemeral",
                }
                .to_string(),
            ),
            level: Some(identity.declared_initial_state.level),
            context: identity
                .declared_initial_state
                .context
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect::<HashMap<_, _>>(),
        })
        .collect();
    Arc::new(HostRegistry::from_entries(entries).unwrap())
}

/// `alpha` at `h1:9000` with level 5.0 and `nous` at `h2:9001` with level 0.1.
pub fn alpha_and_nous() -> (NodeIdentity, NodeIdentity, Arc<HostRegistry>) {
    let alpha = identity("alpha", "h1:9000", Role::Primary, 5.0);
    let nous = identity("nous", "h2:9001", Role::Mobile, 0.1);
    let registry = registry_of(&[alpha.clone(), nous.clone()]);
    (alpha, nous, registry)
}

pub fn fast_probe() -> ProbeConfig {
    ProbeConfig {
        interval: Duration::from_millis(50),
        jitter: Duration::ZERO,
        timeout: Duration::from_millis(200),
        max_in_flight: 4,
    }
}

pub fn fast_sync(mode: SyncMode) -> SyncConfig {
    SyncConfig {
        interval: Duration::from_millis(50),
        jitter: Duration::ZERO,
        timeout: Duration::from_millis(200),
        max_in_flight: 4,
        max_delta: 1.0,
        mode,
    }
}

/// Builds a node wired to `net` and attaches it.
pub fn spawn_node(
    net: &Arc<FakeNetwork>,
    identity: NodeIdentity,
    registry: Arc<HostRegistry>,
    mode: SyncMode,
) -> Arc<CellNode> {
    let client = net.client_for(&identity.id);
    let node = Arc::new(CellNode::new(
        identity,
        registry,
        client,
        fast_probe(),
        fast_sync(mode),
    ));
    net.attach(node.clone());
    node
}

// =============================================================================
// HTTP helpers
// =============================================================================

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

pub async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, Method::GET, uri, None).await
}

pub async fn post_json(
    app: &Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, Method::POST, uri, Some(body)).await
}

/// Posts `body` verbatim, for payloads that are not valid JSON.
pub async fn post_raw(app: &Router, uri: &str, body: &str) -> StatusCode {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap().status()
}
