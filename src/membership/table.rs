//! The Peer Table.
//!
//! Backed by a `DashMap`, so a write for peer X only takes X's shard lock and
//! never waits on an unrelated inbound request for peer Y. Every write is a
//! compare-and-replace inside `entry()`: the comparison and the replacement
//! happen under the same lock.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{DiscoveredVia, PeerRecord, UpsertOutcome};
use crate::registry::types::{NodeId, NodeIdentity};
use crate::sync::types::{MergeOutcome, StateSnapshot};

pub struct PeerTable {
    local_id: NodeId,
    peers: DashMap<NodeId, PeerRecord>,
    stale_updates: AtomicU64,
}

impl PeerTable {
    pub fn new(local_id: NodeId) -> Self {
        Self {
            local_id,
            peers: DashMap::new(),
            stale_updates: AtomicU64::new(0),
        }
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    /// Records a successful contact carrying the peer's identity and state.
    ///
    /// - `ActiveProbe`: we reached the peer ourselves, so it is marked reachable.
    /// - `InboundRegistration`: the peer reached us. A new record starts out
    ///   unreachable; an existing one keeps its probe-derived flag and origin.
    ///
    /// The state is only taken when its version is at least the stored one.
    /// `last_seen_at` never moves backwards.
    pub fn record_contact(
        &self,
        identity: NodeIdentity,
        state: StateSnapshot,
        via: DiscoveredVia,
        now: u64,
    ) -> UpsertOutcome {
        if identity.id == self.local_id {
            tracing::warn!("Ignoring contact record for the local node id {}", identity.id);
            return UpsertOutcome::Refreshed;
        }

        match self.peers.entry(identity.id.clone()) {
            Entry::Vacant(vacant) => {
                tracing::info!(
                    "Discovered new peer {} at {} via {:?}",
                    identity.id,
                    identity.advertised_address,
                    via
                );
                vacant.insert(PeerRecord {
                    identity,
                    last_seen_at: now,
                    last_known_state: state,
                    reachable: via == DiscoveredVia::ActiveProbe,
                    discovered_via: via,
                });
                UpsertOutcome::Created
            }
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                let newer_or_equal = state.version >= current.last_known_state.version;

                let (reachable, discovered_via) = match via {
                    DiscoveredVia::ActiveProbe => (true, DiscoveredVia::ActiveProbe),
                    DiscoveredVia::InboundRegistration => {
                        (current.reachable, current.discovered_via)
                    }
                };

                let last_known_state = if newer_or_equal {
                    state
                } else {
                    tracing::debug!(
                        "Peer {} offered state v{} older than known v{}",
                        identity.id,
                        state.version,
                        current.last_known_state.version
                    );
                    self.note_stale();
                    current.last_known_state.clone()
                };

                let replacement = PeerRecord {
                    last_seen_at: now.max(current.last_seen_at),
                    identity,
                    last_known_state,
                    reachable,
                    discovered_via,
                };
                occupied.insert(replacement);

                if newer_or_equal {
                    UpsertOutcome::Replaced
                } else {
                    UpsertOutcome::Refreshed
                }
            }
        }
    }

    /// A probe succeeded but no state came back with it (the registration
    /// call failed). Creates the record from the declared identity if needed.
    pub fn mark_reachable(&self, identity: &NodeIdentity, now: u64) {
        if identity.id == self.local_id {
            return;
        }

        match self.peers.entry(identity.id.clone()) {
            Entry::Vacant(vacant) => {
                tracing::info!(
                    "Discovered new peer {} at {} via probe",
                    identity.id,
                    identity.advertised_address
                );
                vacant.insert(PeerRecord {
                    identity: identity.clone(),
                    last_seen_at: now,
                    last_known_state: StateSnapshot::initial(&identity.declared_initial_state),
                    reachable: true,
                    discovered_via: DiscoveredVia::ActiveProbe,
                });
            }
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                record.last_seen_at = now.max(record.last_seen_at);
                record.reachable = true;
                record.discovered_via = DiscoveredVia::ActiveProbe;
            }
        }
    }

    /// A probe failed. Leaves everything but the flag untouched; unknown peers
    /// are not created.
    pub fn mark_unreachable(&self, id: &NodeId) -> bool {
        match self.peers.get_mut(id) {
            Some(mut record) => {
                if record.reachable {
                    tracing::info!("Peer {} is no longer reachable", id);
                }
                record.reachable = false;
                true
            }
            None => false,
        }
    }

    /// Last-writer-wins merge of a peer's self-reported state.
    ///
    /// Replaces the stored state only when `state.version` is strictly newer,
    /// or when the peer has no record yet, in which case one is created from
    /// `identity`.
    pub fn merge_state(
        &self,
        identity: impl FnOnce() -> NodeIdentity,
        sender: &NodeId,
        state: StateSnapshot,
        now: u64,
    ) -> MergeOutcome {
        match self.peers.entry(sender.clone()) {
            Entry::Vacant(vacant) => {
                let version = state.version;
                let identity = identity();
                tracing::info!("Discovered new peer {} via sync", identity.id);
                vacant.insert(PeerRecord {
                    identity,
                    last_seen_at: now,
                    last_known_state: state,
                    reachable: false,
                    discovered_via: DiscoveredVia::InboundRegistration,
                });
                MergeOutcome::Applied { version }
            }
            Entry::Occupied(mut occupied) => {
                let known = occupied.get().last_known_state.version;
                if state.version > known {
                    let current = occupied.get();
                    let replacement = PeerRecord {
                        identity: current.identity.clone(),
                        last_seen_at: now.max(current.last_seen_at),
                        last_known_state: state,
                        reachable: current.reachable,
                        discovered_via: current.discovered_via,
                    };
                    let version = replacement.last_known_state.version;
                    occupied.insert(replacement);
                    MergeOutcome::Applied { version }
                } else {
                    tracing::debug!(
                        "Ignoring stale state v{} from {} (known v{})",
                        state.version,
                        sender,
                        known
                    );
                    self.note_stale();
                    MergeOutcome::Stale { known }
                }
            }
        }
    }

    pub fn get(&self, id: &NodeId) -> Option<PeerRecord> {
        self.peers.get(id).map(|entry| entry.value().clone())
    }

    pub fn known_version(&self, id: &NodeId) -> Option<u64> {
        self.peers
            .get(id)
            .map(|entry| entry.value().last_known_state.version)
    }

    /// Operator-initiated removal. The core never evicts on its own.
    pub fn remove(&self, id: &NodeId) -> Option<PeerRecord> {
        let removed = self.peers.remove(id).map(|(_, record)| record);
        if removed.is_some() {
            tracing::info!("Peer {} removed from peer table", id);
        }
        removed
    }

    /// Deep copy of every record, ordered by peer id.
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        let mut records: Vec<PeerRecord> = self
            .peers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.identity.id.cmp(&b.identity.id));
        records
    }

    pub fn reachable_peers(&self) -> Vec<PeerRecord> {
        self.snapshot()
            .into_iter()
            .filter(|record| record.reachable)
            .collect()
    }

    pub fn reachable_count(&self) -> usize {
        self.peers.iter().filter(|entry| entry.value().reachable).count()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn stale_update_count(&self) -> u64 {
        self.stale_updates.load(Ordering::Relaxed)
    }

    fn note_stale(&self) {
        self.stale_updates.fetch_add(1, Ordering::Relaxed);
    }
}
