use axum::extract::rejection::JsonRejection;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json, http::StatusCode};
use std::sync::Arc;

use super::protocol::{DeltaResponse, SyncRequest, SyncResponse};
use super::synchronizer::StateSynchronizer;
use super::types::{StateDelta, SyncEnvelope};
use crate::error::EnvelopeError;

/// `POST /sync`: merge a pushed envelope into the peer table.
pub async fn handle_sync(
    Extension(sync): Extension<Arc<StateSynchronizer>>,
    body: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SyncResponse>), EnvelopeError> {
    let Json(request) = body?;
    let envelope = request.into_envelope()?;
    let outcome = sync.merge_remote(envelope)?;

    Ok((
        StatusCode::OK,
        Json(SyncResponse {
            accepted: outcome.accepted(),
            current_version_known: outcome.known_version(),
        }),
    ))
}

/// `GET /sync`: our own envelope, for pull-style sync.
pub async fn handle_pull(
    Extension(sync): Extension<Arc<StateSynchronizer>>,
) -> (StatusCode, Json<SyncEnvelope>) {
    (StatusCode::OK, Json(sync.envelope().await))
}

/// `POST /state/delta`: apply a local delta to this node's own state.
pub async fn handle_local_delta(
    Extension(sync): Extension<Arc<StateSynchronizer>>,
    body: Result<Json<StateDelta>, JsonRejection>,
) -> Response {
    let delta = match body {
        Ok(Json(delta)) => delta,
        Err(rejection) => return EnvelopeError::from(rejection).into_response(),
    };

    match sync.apply_local_delta(delta).await {
        Ok(self_state) => (StatusCode::OK, Json(DeltaResponse { self_state })).into_response(),
        Err(e) => e.into_response(),
    }
}
