use axum::extract::Path;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json, http::StatusCode};
use std::sync::Arc;

use super::protocol::*;
use crate::error::ErrorResponse;
use crate::membership::table::PeerTable;
use crate::registry::hosts::HostRegistry;
use crate::registry::types::{NodeId, NodeIdentity};
use crate::sync::synchronizer::StateSynchronizer;

pub async fn handle_health(
    Extension(local): Extension<Arc<NodeIdentity>>,
    Extension(registry): Extension<Arc<HostRegistry>>,
    Extension(table): Extension<Arc<PeerTable>>,
    Extension(sync): Extension<Arc<StateSynchronizer>>,
) -> (StatusCode, Json<HealthResponse>) {
    let state = sync.snapshot().await;
    let reachable_peer_count = table.reachable_count();
    let alone = registry.peers_of(&local.id).next().is_none();

    let status = if reachable_peer_count > 0 || alone {
        STATUS_HEALTHY
    } else {
        STATUS_ISOLATED
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: status.to_string(),
            self_id: local.id.clone(),
            role: local.role,
            level: state.level,
            version: state.version,
            reachable_peer_count,
        }),
    )
}

pub async fn handle_peers(
    Extension(local): Extension<Arc<NodeIdentity>>,
    Extension(table): Extension<Arc<PeerTable>>,
) -> (StatusCode, Json<PeersResponse>) {
    let peers: Vec<PeerView> = table.snapshot().into_iter().map(PeerView::from).collect();

    (
        StatusCode::OK,
        Json(PeersResponse {
            count: peers.len(),
            peers,
            self_id: local.id.clone(),
        }),
    )
}

pub async fn handle_status(
    Extension(local): Extension<Arc<NodeIdentity>>,
    Extension(table): Extension<Arc<PeerTable>>,
    Extension(sync): Extension<Arc<StateSynchronizer>>,
) -> (StatusCode, Json<StatusResponse>) {
    let state = sync.snapshot().await;
    let peers: Vec<PeerView> = table.snapshot().into_iter().map(PeerView::from).collect();
    let reachable_peer_count = peers.iter().filter(|p| p.reachable).count();

    (
        StatusCode::OK,
        Json(StatusResponse {
            self_view: SelfView {
                id: local.id.clone(),
                address: local.advertised_address.clone(),
                role: local.role,
                state,
            },
            count: peers.len(),
            peers,
            reachable_peer_count,
            stale_updates: table.stale_update_count(),
            aggregate: sync.peer_aggregate(),
        }),
    )
}

/// `DELETE /peers/:id`: operator eviction of a single record.
pub async fn handle_remove_peer(
    Extension(table): Extension<Arc<PeerTable>>,
    Path(id): Path<String>,
) -> Response {
    let id = NodeId(id);
    match table.remove(&id) {
        Some(_) => (StatusCode::OK, Json(RemovePeerResponse { removed: id })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("peer `{}` not found", id),
            }),
        )
            .into_response(),
    }
}
