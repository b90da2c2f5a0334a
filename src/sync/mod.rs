//! State Synchronization Module
//!
//! Keeps this node's own state and exchanges versioned snapshots with peers.
//!
//! ## Merge Rule
//! Per peer, last-writer-wins on `version`: an incoming envelope replaces the
//! stored state only when its version is strictly newer. Anything else is
//! counted as a stale update and dropped. A peer's data is stored as *its*
//! claim and is never folded into the local state.
//!
//! ## Directions
//! - **Push**: `POST /sync` our envelope to every reachable peer.
//! - **Pull**: `GET /sync` from a peer and merge the reply.

pub mod handlers;
pub mod protocol;
pub mod synchronizer;
pub mod types;
