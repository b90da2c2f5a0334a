//! Outbound calls to peers.
//!
//! Everything the prober, the registration protocol and the synchronizer send
//! over the network goes through [`PeerClient`]. The production implementation
//! speaks JSON over HTTP with `reqwest`; tests plug in an in-process fake.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ProbeError;
use crate::registration::protocol::{ENDPOINT_REGISTER, RegisterRequest, RegisterResponse};
use crate::registry::types::NodeIdentity;
use crate::status::protocol::ENDPOINT_HEALTH;
use crate::sync::protocol::{ENDPOINT_SYNC, SyncRequest, SyncResponse};
use crate::sync::types::SyncEnvelope;

#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Bounded-time liveness check against the peer's advertised address.
    async fn probe(&self, peer: &NodeIdentity, timeout: Duration) -> Result<(), ProbeError>;

    /// Offers our identity and state; returns the peer's.
    async fn register(
        &self,
        peer: &NodeIdentity,
        request: &RegisterRequest,
        timeout: Duration,
    ) -> Result<RegisterResponse, ProbeError>;

    /// Pushes our envelope to the peer.
    async fn push_state(
        &self,
        peer: &NodeIdentity,
        envelope: &SyncEnvelope,
        timeout: Duration,
    ) -> Result<SyncResponse, ProbeError>;

    /// Fetches the peer's current envelope.
    async fn pull_state(
        &self,
        peer: &NodeIdentity,
        timeout: Duration,
    ) -> Result<SyncEnvelope, ProbeError>;
}

/// JSON-over-HTTP client.
#[derive(Clone, Default)]
pub struct HttpPeerClient {
    http_client: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }

    fn url(peer: &NodeIdentity, endpoint: &str) -> Result<String, ProbeError> {
        if peer.advertised_address.is_empty() {
            return Err(ProbeError::Transport(format!(
                "no known address for {}",
                peer.id
            )));
        }
        Ok(format!("{}{}", peer.base_url(), endpoint))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProbeError> {
        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status().as_u16()));
        }
        response.json::<T>().await.map_err(classify)
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn probe(&self, peer: &NodeIdentity, timeout: Duration) -> Result<(), ProbeError> {
        let url = Self::url(peer, ENDPOINT_HEALTH)?;
        let response = self
            .http_client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        if !response.status().is_success() {
            return Err(ProbeError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn register(
        &self,
        peer: &NodeIdentity,
        request: &RegisterRequest,
        timeout: Duration,
    ) -> Result<RegisterResponse, ProbeError> {
        let url = Self::url(peer, ENDPOINT_REGISTER)?;
        let response = self
            .http_client
            .post(url)
            .json(request)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        Self::read_json(response).await
    }

    async fn push_state(
        &self,
        peer: &NodeIdentity,
        envelope: &SyncEnvelope,
        timeout: Duration,
    ) -> Result<SyncResponse, ProbeError> {
        let url = Self::url(peer, ENDPOINT_SYNC)?;
        let response = self
            .http_client
            .post(url)
            .json(&SyncRequest::from(envelope))
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        Self::read_json(response).await
    }

    async fn pull_state(
        &self,
        peer: &NodeIdentity,
        timeout: Duration,
    ) -> Result<SyncEnvelope, ProbeError> {
        let url = Self::url(peer, ENDPOINT_SYNC)?;
        let response = self
            .http_client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;

        Self::read_json(response).await
    }
}

/// Maps a `reqwest` failure onto the probe error taxonomy.
fn classify(err: reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        ProbeError::Timeout
    } else if err.is_connect() {
        ProbeError::Refused
    } else if let Some(status) = err.status() {
        ProbeError::Status(status.as_u16())
    } else {
        ProbeError::Transport(err.to_string())
    }
}
