//! Host Registry
//!
//! The static, loaded-once description of every cell that may take part in the
//! mesh: its id, the address it advertises, its declared role and the state it
//! starts from.
//!
//! The registry is built once at startup and shared by `Arc` with the prober,
//! the registration service and the synchronizer. It is never mutated after
//! [`hosts::HostRegistry::load`] returns, so readers need no locking.

pub mod hosts;
pub mod types;
