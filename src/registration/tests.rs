//! Registration Module Tests
//!
//! ## Test Scopes
//! - **Inbound**: validation of `/register` payloads, idempotent upserts, the
//!   echoed identity and state.
//! - **Outbound**: `register_with` recording the peer's reply.
//! - **HTTP**: the handler's status codes through the real router.

use axum::http::StatusCode;
use serde_json::json;

use super::protocol::{RegisterRequest, WireState};
use crate::error::{EnvelopeError, ProbeError};
use crate::membership::types::{DiscoveredVia, UpsertOutcome};
use crate::registry::types::{NodeId, Role};
use crate::sync::types::{StateDelta, SyncMode};
use crate::testing::{FakeNetwork, alpha_and_nous, get_json, post_json, post_raw, spawn_node};

fn request(id: &str, address: &str, level: f64, version: Option<u64>) -> RegisterRequest {
    RegisterRequest {
        id: Some(NodeId::from(id)),
        address: Some(address.to_string()),
        role: None,
        declared_state: Some(WireState {
            level: Some(level),
            context: None,
            version,
        }),
    }
}

// ============================================================
// INBOUND
// ============================================================

#[tokio::test]
async fn test_accept_records_caller_and_echoes_self() {
    let net = FakeNetwork::new();
    let (alpha, nous, registry) = alpha_and_nous();
    let n = spawn_node(&net, nous, registry, SyncMode::Off);

    let response = n
        .registration
        .accept(request("alpha", "h1:9000", 5.0, Some(0)))
        .await
        .unwrap();

    assert_eq!(response.id, NodeId::from("nous"));
    assert_eq!(response.address, "h2:9001");
    assert_eq!(response.role, Role::Mobile);
    assert_eq!(response.self_state.level, 0.1);

    let record = n.table.get(&alpha.id).unwrap();
    assert_eq!(record.identity.advertised_address, "h1:9000");
    // Role falls back to the registry when the caller leaves it out.
    assert_eq!(record.identity.role, Role::Primary);
    assert_eq!(record.last_known_state.level, 5.0);
    assert!(!record.reachable);
    assert_eq!(record.discovered_via, DiscoveredVia::InboundRegistration);
}

#[tokio::test]
async fn test_accept_unregistered_caller() {
    let net = FakeNetwork::new();
    let (_, nous, registry) = alpha_and_nous();
    let n = spawn_node(&net, nous, registry, SyncMode::Off);

    let mut req = request("drifter", "10.1.1.1:7000", 2.5, None);
    req.role = Some(Role::Ephemeral);
    n.registration.accept(req).await.unwrap();

    let record = n.table.get(&NodeId::from("drifter")).unwrap();
    assert_eq!(record.identity.role, Role::Ephemeral);
    assert_eq!(record.last_known_state.version, 0);
    assert_eq!(record.identity.declared_initial_state.level, 2.5);
}

#[tokio::test]
async fn test_duplicate_registration_is_idempotent() {
    let net = FakeNetwork::new();
    let (alpha, nous, registry) = alpha_and_nous();
    let n = spawn_node(&net, nous, registry, SyncMode::Off);

    n.registration
        .accept(request("alpha", "h1:9000", 5.0, Some(1)))
        .await
        .unwrap();
    let first_seen = n.table.get(&alpha.id).unwrap().last_seen_at;

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    n.registration
        .accept(request("alpha", "h1:9000", 5.0, Some(1)))
        .await
        .unwrap();

    assert_eq!(n.table.len(), 1);
    let second_seen = n.table.get(&alpha.id).unwrap().last_seen_at;
    assert!(second_seen > first_seen);
}

#[tokio::test]
async fn test_older_registration_does_not_regress_state() {
    let net = FakeNetwork::new();
    let (alpha, nous, registry) = alpha_and_nous();
    let n = spawn_node(&net, nous, registry, SyncMode::Off);

    n.registration
        .accept(request("alpha", "h1:9000", 6.0, Some(4)))
        .await
        .unwrap();
    n.registration
        .accept(request("alpha", "h1:9000", 5.0, Some(2)))
        .await
        .unwrap();

    let record = n.table.get(&alpha.id).unwrap();
    assert_eq!(record.last_known_state.version, 4);
    assert_eq!(record.last_known_state.level, 6.0);
    assert_eq!(n.table.stale_update_count(), 1);
}

#[tokio::test]
async fn test_malformed_registration_mutates_nothing() {
    let net = FakeNetwork::new();
    let (_, nous, registry) = alpha_and_nous();
    let n = spawn_node(&net, nous, registry, SyncMode::Off);

    let mut missing_id = request("alpha", "h1:9000", 5.0, None);
    missing_id.id = None;
    assert_eq!(
        n.registration.accept(missing_id).await,
        Err(EnvelopeError::MissingField("id"))
    );

    let mut missing_address = request("alpha", "h1:9000", 5.0, None);
    missing_address.address = None;
    assert_eq!(
        n.registration.accept(missing_address).await,
        Err(EnvelopeError::MissingField("address"))
    );

    let bad_address = request("alpha", "h1", 5.0, None);
    assert!(matches!(
        n.registration.accept(bad_address).await,
        Err(EnvelopeError::InvalidValue { field: "address", .. })
    ));

    let mut missing_state = request("alpha", "h1:9000", 5.0, None);
    missing_state.declared_state = None;
    assert_eq!(
        n.registration.accept(missing_state).await,
        Err(EnvelopeError::MissingField("declaredState"))
    );

    let mut missing_level = request("alpha", "h1:9000", 5.0, None);
    missing_level.declared_state = Some(WireState::default());
    assert_eq!(
        n.registration.accept(missing_level).await,
        Err(EnvelopeError::MissingField("level"))
    );

    assert!(n.table.is_empty());
}

#[tokio::test]
async fn test_self_registration_is_rejected() {
    let net = FakeNetwork::new();
    let (_, nous, registry) = alpha_and_nous();
    let n = spawn_node(&net, nous, registry, SyncMode::Off);

    let result = n
        .registration
        .accept(request("nous", "h2:9001", 0.1, None))
        .await;
    assert_eq!(result, Err(EnvelopeError::SelfAddressed("nous".to_string())));
    assert!(n.table.is_empty());
}

// ============================================================
// OUTBOUND
// ============================================================

#[tokio::test]
async fn test_register_with_records_echoed_state() {
    let net = FakeNetwork::new();
    let (alpha, nous, registry) = alpha_and_nous();
    let a = spawn_node(&net, alpha.clone(), registry.clone(), SyncMode::Off);
    let n = spawn_node(&net, nous.clone(), registry, SyncMode::Off);

    n.sync
        .apply_local_delta(StateDelta {
            level: 0.4,
            context: Default::default(),
        })
        .await
        .unwrap();

    let outcome = a.registration.register_with(&nous).await.unwrap();
    assert_eq!(outcome, UpsertOutcome::Created);

    let record = a.table.get(&nous.id).unwrap();
    assert_eq!(record.last_known_state.version, 1);
    assert!((record.last_known_state.level - 0.5).abs() < 1e-9);
    assert!(record.reachable);

    // The callee learned about us in the same exchange.
    assert!(n.table.get(&alpha.id).is_some());

    let again = a.registration.register_with(&nous).await.unwrap();
    assert_eq!(again, UpsertOutcome::Replaced);
    assert_eq!(a.table.len(), 1);
}

#[tokio::test]
async fn test_register_with_unreachable_peer_fails() {
    let net = FakeNetwork::new();
    let (alpha, nous, registry) = alpha_and_nous();
    let a = spawn_node(&net, alpha, registry, SyncMode::Off);

    let result = a.registration.register_with(&nous).await;
    assert_eq!(result, Err(ProbeError::Refused));
    assert!(a.table.is_empty());
}

#[tokio::test]
async fn test_outbound_request_carries_current_state() {
    let net = FakeNetwork::new();
    let (alpha, _, registry) = alpha_and_nous();
    let a = spawn_node(&net, alpha, registry, SyncMode::Off);

    let req = a.registration.outbound_request().await;
    assert_eq!(req.id, Some(NodeId::from("alpha")));
    assert_eq!(req.address.as_deref(), Some("h1:9000"));
    assert_eq!(req.role, Some(Role::Primary));
    let state = req.declared_state.unwrap();
    assert_eq!(state.level, Some(5.0));
    assert_eq!(state.version, Some(0));
}

// ============================================================
// HTTP
// ============================================================

#[tokio::test]
async fn test_register_endpoint() {
    let net = FakeNetwork::new();
    let (_, nous, registry) = alpha_and_nous();
    let n = spawn_node(&net, nous, registry, SyncMode::Off);
    let app = n.router();

    let (status, body) = post_json(
        &app,
        "/register",
        json!({"id": "alpha", "address": "h1:9000", "declaredState": {"level": 5.0}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "nous");
    assert_eq!(body["address"], "h2:9001");
    assert_eq!(body["selfState"]["level"], 0.1);

    let (_, peers) = get_json(&app, "/peers").await;
    assert_eq!(peers["count"], 1);
}

#[tokio::test]
async fn test_register_endpoint_client_errors() {
    let net = FakeNetwork::new();
    let (_, nous, registry) = alpha_and_nous();
    let n = spawn_node(&net, nous, registry, SyncMode::Off);
    let app = n.router();

    let (status, body) = post_json(
        &app,
        "/register",
        json!({"address": "h1:9000", "declaredState": {"level": 5.0}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("id"));

    let (status, _) = post_json(
        &app,
        "/register",
        json!({"id": "nous", "address": "h2:9001", "declaredState": {"level": 1.0}}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let status = post_raw(&app, "/register", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(n.table.is_empty());
}
