use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json, http::StatusCode};
use std::sync::Arc;

use super::protocol::{RegisterRequest, RegisterResponse};
use super::service::RegistrationService;
use crate::error::EnvelopeError;

/// `POST /register`: record the caller and answer with our identity and state.
pub async fn handle_register(
    Extension(registration): Extension<Arc<RegistrationService>>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), EnvelopeError> {
    let Json(request) = body?;
    let response = registration.accept(request).await?;
    Ok((StatusCode::OK, Json(response)))
}
