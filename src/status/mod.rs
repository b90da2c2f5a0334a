//! Status Module
//!
//! Read-only views of this node for operators and dashboards. Every handler
//! serves from memory: nothing here waits on a probe or any other network call,
//! so the endpoints answer even when every peer is unreachable.

pub mod handlers;
pub mod protocol;
