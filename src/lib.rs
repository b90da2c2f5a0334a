//! Cell Mesh Library
//!
//! Peer discovery and state synchronization for a small set of independently
//! operated nodes ("cells") that may join, leave or become unreachable at any
//! time. The binary (`main.rs`) is a thin shell around [`node::CellNode`].
//!
//! ## Architecture Modules
//!
//! - **`registry`**: The immutable host registry, loaded once at startup and
//!   shared by reference with everything that needs to know the mesh.
//! - **`membership`**: The live peer table plus the reachability prober that
//!   keeps it current through bounded, jittered probe rounds.
//! - **`registration`**: The bidirectional handshake that makes the mesh aware
//!   of peers it cannot reach itself (NAT, firewalls).
//! - **`sync`**: Ownership of the local state and last-writer-wins exchange of
//!   peers' self-reported state, push and pull.
//! - **`status`**: Read-only health, peer and status views served from memory.
//! - **`transport`**: The `PeerClient` seam for every outbound call.
//! - **`node`**, **`config`**, **`error`**: Composition, configuration and the
//!   shared error taxonomy.

pub mod config;
pub mod error;
pub mod membership;
pub mod node;
pub mod registration;
pub mod registry;
pub mod status;
pub mod sync;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;
