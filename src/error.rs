//! Error taxonomy shared by every subsystem.
//!
//! Only [`ConfigError`] is fatal, and only at startup. Probe failures are
//! recorded per peer and retried on the next round, envelope errors are turned
//! into client-error responses, and stale updates are not errors at all (see
//! `MergeOutcome::Stale`).

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Invalid or unreadable registry/configuration. The process must not start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("host registry is empty")]
    EmptyRegistry,

    #[error("host registry declares id `{0}` more than once")]
    DuplicateId(String),

    #[error("host entry #{index} is missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("invalid address `{address}` for `{id}`: expected host:port")]
    InvalidAddress { id: String, address: String },

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Why a single outbound call to a peer failed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProbeError {
    #[error("timed out")]
    Timeout,

    #[error("connection refused")]
    Refused,

    #[error("peer answered with HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("expected peer `{expected}` but `{actual}` answered")]
    IdentityMismatch { expected: String, actual: String },
}

/// A malformed inbound `/register` or `/sync` payload.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnvelopeError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("envelope claims the local node id `{0}`")]
    SelfAddressed(String),

    #[error("malformed body: {0}")]
    Body(String),
}

/// A local state change that could not be applied.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    #[error("delta component `{0}` is not a finite number")]
    NonFinite(String),
}

/// Body of every client-error response.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

impl EnvelopeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EnvelopeError::SelfAddressed(_) => StatusCode::CONFLICT,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<JsonRejection> for EnvelopeError {
    fn from(rejection: JsonRejection) -> Self {
        EnvelopeError::Body(rejection.body_text())
    }
}

impl IntoResponse for EnvelopeError {
    fn into_response(self) -> Response {
        tracing::warn!("Rejected inbound envelope: {}", self);
        (
            self.status_code(),
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
