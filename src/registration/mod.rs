//! Registration Protocol
//!
//! Compensates for asymmetric reachability. When A's probe reaches B, A posts
//! its identity and state to B's `/register`. B records A even if B could never
//! probe A itself (NAT, firewall), and answers with its own identity and state,
//! which A records as an active-probe contact. As long as the reachable side
//! keeps probing, both sides end up knowing each other.
//!
//! Duplicate registrations replace the existing record in place.

pub mod handlers;
pub mod protocol;
pub mod service;

#[cfg(test)]
mod tests;
