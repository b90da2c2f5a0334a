//! State Synchronizer
//!
//! Owns this node's `SelfState` and moves state between nodes.
//!
//! The local state is only ever changed by [`StateSynchronizer::apply_local_delta`]
//! (directly, or through the align-to-peers policy, which computes a delta from
//! the peer table and applies it the same way). What peers send us lands in the
//! peer table via [`StateSynchronizer::merge_remote`] and never touches `SelfState`.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};

use super::types::{
    MergeOutcome, PeerAggregate, StateDelta, StateSnapshot, SyncEnvelope, SyncMode,
};
use crate::error::{EnvelopeError, ProbeError, SyncError};
use crate::membership::prober::{bounded, jittered};
use crate::membership::table::PeerTable;
use crate::membership::types::{PeerRecord, now_ms};
use crate::registry::hosts::HostRegistry;
use crate::registry::types::{NodeId, NodeIdentity};
use crate::sync::protocol::SyncResponse;
use crate::transport::PeerClient;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub interval: Duration,
    pub jitter: Duration,
    pub timeout: Duration,
    pub max_in_flight: usize,
    /// Largest magnitude a single local delta may move any component by.
    pub max_delta: f64,
    pub mode: SyncMode,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            jitter: Duration::from_secs(3),
            timeout: Duration::from_secs(5),
            max_in_flight: 8,
            max_delta: 1.0,
            mode: SyncMode::Push,
        }
    }
}

/// Counts from one push/pull round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncRoundSummary {
    pub pushed: usize,
    pub pulled: usize,
    pub failed: usize,
}

/// Per-peer outcome inside one round. `failed` is set if either direction failed.
#[derive(Debug, Default, Clone, Copy)]
struct PeerSyncResult {
    pushed: bool,
    pulled: bool,
    failed: bool,
}

pub struct StateSynchronizer {
    local_id: NodeId,
    registry: Arc<HostRegistry>,
    table: Arc<PeerTable>,
    state: RwLock<StateSnapshot>,
    client: Arc<dyn PeerClient>,
    config: SyncConfig,
}

impl StateSynchronizer {
    pub fn new(
        local: &NodeIdentity,
        registry: Arc<HostRegistry>,
        table: Arc<PeerTable>,
        client: Arc<dyn PeerClient>,
        config: SyncConfig,
    ) -> Self {
        Self {
            local_id: local.id.clone(),
            registry,
            table,
            state: RwLock::new(StateSnapshot::initial(&local.declared_initial_state)),
            client,
            config,
        }
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        self.state.read().await.clone()
    }

    pub async fn envelope(&self) -> SyncEnvelope {
        let state = self.state.read().await;
        SyncEnvelope {
            sender_id: self.local_id.clone(),
            state: state.cell_state(),
            version: state.version,
        }
    }

    /// Adds `delta` to the local level and context, then bumps the version.
    ///
    /// Each component is clamped to `±max_delta`. A non-finite component
    /// rejects the whole delta and leaves the state untouched.
    pub async fn apply_local_delta(&self, delta: StateDelta) -> Result<StateSnapshot, SyncError> {
        if !delta.level.is_finite() {
            return Err(SyncError::NonFinite("level".to_string()));
        }
        if let Some((name, _)) = delta.context.iter().find(|(_, v)| !v.is_finite()) {
            return Err(SyncError::NonFinite(name.clone()));
        }

        let bound = self.config.max_delta.abs();
        let clamp = |value: f64| value.clamp(-bound, bound);

        let mut state = self.state.write().await;
        state.level += clamp(delta.level);
        for (name, value) in &delta.context {
            *state.context.entry(name.clone()).or_insert(0.0) += clamp(*value);
        }
        state.version += 1;

        tracing::info!(
            "Applied local delta: level={:.3} version={}",
            state.level,
            state.version
        );
        Ok(state.clone())
    }

    /// Last-writer-wins merge of a peer's envelope into the peer table.
    ///
    /// Never touches the local state. An envelope claiming the local id is
    /// rejected.
    pub fn merge_remote(&self, envelope: SyncEnvelope) -> Result<MergeOutcome, EnvelopeError> {
        if envelope.sender_id == self.local_id {
            return Err(EnvelopeError::SelfAddressed(self.local_id.0.clone()));
        }

        let sender = envelope.sender_id.clone();
        let registry = &self.registry;
        let outcome = self.table.merge_state(
            || {
                registry
                    .get(&sender)
                    .cloned()
                    .unwrap_or_else(|| NodeIdentity::minimal(sender.clone()))
            },
            &envelope.sender_id,
            envelope.snapshot(),
            now_ms(),
        );

        match outcome {
            MergeOutcome::Applied { version } => {
                tracing::debug!("Merged state v{} from {}", version, envelope.sender_id)
            }
            MergeOutcome::Stale { known } => tracing::debug!(
                "Stale envelope v{} from {} (known v{})",
                envelope.version,
                envelope.sender_id,
                known
            ),
        }
        Ok(outcome)
    }

    /// Pushes our envelope to one peer.
    pub async fn push_to(&self, peer: &NodeIdentity) -> Result<SyncResponse, ProbeError> {
        let envelope = self.envelope().await;
        let timeout = self.config.timeout;
        bounded(timeout, self.client.push_state(peer, &envelope, timeout)).await
    }

    /// Pulls one peer's envelope and merges it.
    pub async fn pull_from(&self, peer: &NodeIdentity) -> Result<MergeOutcome, ProbeError> {
        let timeout = self.config.timeout;
        let envelope = bounded(timeout, self.client.pull_state(peer, timeout)).await?;
        if envelope.sender_id != peer.id {
            return Err(ProbeError::IdentityMismatch {
                expected: peer.id.0.clone(),
                actual: envelope.sender_id.0,
            });
        }
        self.merge_remote(envelope)
            .map_err(|e| ProbeError::Transport(e.to_string()))
    }

    /// One push and/or pull pass over every reachable peer, per the configured mode.
    pub async fn sync_round(&self) -> SyncRoundSummary {
        self.sync_round_with(self.config.mode).await
    }

    pub async fn sync_round_with(&self, mode: SyncMode) -> SyncRoundSummary {
        let mut summary = SyncRoundSummary::default();
        if mode == SyncMode::Off {
            return summary;
        }

        let targets: Vec<PeerRecord> = self
            .table
            .reachable_peers()
            .into_iter()
            .filter(|record| !record.identity.advertised_address.is_empty())
            .collect();

        let results: Vec<PeerSyncResult> = futures::stream::iter(targets)
            .map(|record| async move {
                let peer = &record.identity;
                let mut result = PeerSyncResult::default();

                if mode.pushes() {
                    match self.push_to(peer).await {
                        Ok(response) => {
                            tracing::trace!(
                                "Pushed state to {} (accepted={}, known v{})",
                                peer.id,
                                response.accepted,
                                response.current_version_known
                            );
                            result.pushed = true;
                        }
                        Err(e) => {
                            tracing::warn!("Failed to push state to {}: {}", peer.id, e);
                            result.failed = true;
                        }
                    }
                }

                if mode.pulls() {
                    match self.pull_from(peer).await {
                        Ok(_) => result.pulled = true,
                        Err(e) => {
                            tracing::warn!("Failed to pull state from {}: {}", peer.id, e);
                            result.failed = true;
                        }
                    }
                }

                result
            })
            .buffer_unordered(self.config.max_in_flight.max(1))
            .collect()
            .await;

        for result in results {
            summary.pushed += usize::from(result.pushed);
            summary.pulled += usize::from(result.pulled);
            summary.failed += usize::from(result.failed);
        }
        summary
    }

    /// Mean state of the reachable peers, or `None` if none is reachable.
    pub fn peer_aggregate(&self) -> Option<PeerAggregate> {
        let peers = self.table.reachable_peers();
        if peers.is_empty() {
            return None;
        }

        let count = peers.len() as f64;
        let mut level = 0.0;
        let mut sums: std::collections::BTreeMap<String, (f64, usize)> = Default::default();
        for record in &peers {
            level += record.last_known_state.level;
            for (name, value) in &record.last_known_state.context {
                let slot = sums.entry(name.clone()).or_insert((0.0, 0));
                slot.0 += value;
                slot.1 += 1;
            }
        }

        Some(PeerAggregate {
            peer_count: peers.len(),
            level: level / count,
            context: sums
                .into_iter()
                .map(|(name, (sum, n))| (name, sum / n as f64))
                .collect(),
        })
    }

    /// Local policy: move `weight` of the way toward the peer average.
    ///
    /// Goes through `apply_local_delta`, so the usual clamping and version bump
    /// apply. Returns `None` when no peer is reachable.
    pub async fn align_to_peers(&self, weight: f64) -> Result<Option<StateSnapshot>, SyncError> {
        let Some(aggregate) = self.peer_aggregate() else {
            return Ok(None);
        };
        if !weight.is_finite() {
            return Err(SyncError::NonFinite("weight".to_string()));
        }
        let weight = weight.clamp(0.0, 1.0);

        let current = self.snapshot().await;
        let delta = StateDelta {
            level: weight * (aggregate.level - current.level),
            context: aggregate
                .context
                .iter()
                .map(|(name, avg)| {
                    let mine = current.context.get(name).copied().unwrap_or(0.0);
                    (name.clone(), weight * (avg - mine))
                })
                .collect(),
        };

        self.apply_local_delta(delta).await.map(Some)
    }

    /// Runs sync rounds on a jittered interval until `shutdown` flips.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        if self.config.mode == SyncMode::Off {
            tracing::info!("Sync loop disabled");
            return;
        }
        tracing::info!(
            "Starting sync loop ({:?}, every {:?})",
            self.config.mode,
            self.config.interval
        );

        loop {
            let delay = jittered(self.config.interval, self.config.jitter);
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            if *shutdown.borrow() {
                break;
            }

            let summary = self.sync_round().await;
            tracing::debug!(
                "Sync round: pushed={} pulled={} failed={}",
                summary.pushed,
                summary.pulled,
                summary.failed
            );
        }

        tracing::info!("Sync loop stopped");
    }
}
