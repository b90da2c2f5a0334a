//! Reachability Prober
//!
//! Probes every registered host except self on a jittered interval.
//!
//! ## Round Structure
//! 1. Collect the registry's peers.
//! 2. Probe them with at most `max_in_flight` checks running at once; each one
//!    carries its own timeout so a dead peer cannot stall the rest.
//! 3. Reachable peers go through the registration handshake; unreachable ones
//!    only get `reachable = false` on their existing record.
//!
//! Failures are never retried inside a round; the next round is the retry.

use futures::StreamExt;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::table::PeerTable;
use super::types::{ProbeOutcome, now_ms};
use crate::error::ProbeError;
use crate::registration::service::RegistrationService;
use crate::registry::hosts::HostRegistry;
use crate::registry::types::{NodeId, NodeIdentity};
use crate::transport::PeerClient;

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub interval: Duration,
    /// Upper bound of the random delay added to each interval.
    pub jitter: Duration,
    pub timeout: Duration,
    pub max_in_flight: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            jitter: Duration::from_secs(3),
            timeout: Duration::from_secs(5),
            max_in_flight: 8,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProbeRoundSummary {
    pub reachable: usize,
    pub unreachable: usize,
}

pub struct Prober {
    local_id: NodeId,
    registry: Arc<HostRegistry>,
    table: Arc<PeerTable>,
    registration: Arc<RegistrationService>,
    client: Arc<dyn PeerClient>,
    config: ProbeConfig,
}

impl Prober {
    pub fn new(
        local_id: NodeId,
        registry: Arc<HostRegistry>,
        table: Arc<PeerTable>,
        registration: Arc<RegistrationService>,
        client: Arc<dyn PeerClient>,
        config: ProbeConfig,
    ) -> Self {
        Self {
            local_id,
            registry,
            table,
            registration,
            client,
            config,
        }
    }

    /// A single bounded-time liveness check. Touches no state.
    ///
    /// The timeout is enforced here as well as handed to the client, so a
    /// client that ignores it cannot hold up the round.
    pub async fn probe_once(&self, identity: &NodeIdentity) -> ProbeOutcome {
        let timeout = self.config.timeout;
        match bounded(timeout, self.client.probe(identity, timeout)).await {
            Ok(()) => ProbeOutcome::Reachable,
            Err(e) => ProbeOutcome::Unreachable(e.into()),
        }
    }

    /// Probes one peer and applies the result to the peer table, registering
    /// with the peer when it answers.
    pub async fn probe_peer(&self, identity: &NodeIdentity) -> ProbeOutcome {
        let outcome = self.probe_once(identity).await;

        match &outcome {
            ProbeOutcome::Reachable => {
                tracing::trace!("Probe to {} succeeded", identity.id);
                if let Err(e) = self.registration.register_with(identity).await {
                    tracing::warn!(
                        "Peer {} answered the probe but registration failed: {}",
                        identity.id,
                        e
                    );
                    self.table.mark_reachable(identity, now_ms());
                }
            }
            ProbeOutcome::Unreachable(reason) => {
                tracing::debug!(
                    "Peer {} at {} unreachable: {}",
                    identity.id,
                    identity.advertised_address,
                    reason
                );
                self.table.mark_unreachable(&identity.id);
            }
        }

        outcome
    }

    /// One pass over every registered peer.
    pub async fn probe_round(&self) -> ProbeRoundSummary {
        let targets: Vec<NodeIdentity> = self.registry.peers_of(&self.local_id).cloned().collect();

        let outcomes: Vec<ProbeOutcome> = futures::stream::iter(targets)
            .map(|identity| async move { self.probe_peer(&identity).await })
            .buffer_unordered(self.config.max_in_flight.max(1))
            .collect()
            .await;

        let reachable = outcomes.iter().filter(|o| o.is_reachable()).count();
        ProbeRoundSummary {
            reachable,
            unreachable: outcomes.len() - reachable,
        }
    }

    /// Probes immediately, then every `interval + jitter`, until `shutdown`
    /// flips. A round already in flight is allowed to finish.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Starting probe loop over {} peer(s), every {:?}",
            self.registry.peers_of(&self.local_id).count(),
            self.config.interval
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let summary = self.probe_round().await;
            tracing::debug!(
                "Probe round: {} reachable, {} unreachable",
                summary.reachable,
                summary.unreachable
            );

            let delay = jittered(self.config.interval, self.config.jitter);
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Probe loop stopped");
    }
}

/// Runs one outbound call, giving up with [`ProbeError::Timeout`] once
/// `timeout` has elapsed.
pub async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, ProbeError>>,
) -> Result<T, ProbeError> {
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(ProbeError::Timeout))
}

/// `base` plus a uniformly random extra in `[0, jitter]`.
pub fn jittered(base: Duration, jitter: Duration) -> Duration {
    let jitter_ms = jitter.as_millis() as u64;
    if jitter_ms == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
}
