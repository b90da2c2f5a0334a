//! Membership & Discovery Module
//!
//! The node's live view of the mesh and the loop that keeps it fresh.
//!
//! ## Core Mechanisms
//! - **Peer Table**: one [`types::PeerRecord`] per peer id, created on first
//!   contact and replaced (never appended) on every later one. Records are never
//!   evicted automatically; staleness shows up as the age of `lastSeenAt`.
//! - **Active Probing**: every registered host except self is probed on a jittered
//!   interval with a bounded number of probes in flight. A successful probe hands
//!   the peer to the registration protocol; a failed one only flips `reachable`.
//! - **Compare-and-replace**: all writes go through the table's per-entry locks and
//!   compare versions/timestamps first, so retries and out-of-order delivery never
//!   regress a record.

pub mod prober;
pub mod table;
pub mod types;
