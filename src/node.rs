//! Cell Node
//!
//! Wires the subsystems of one cell together:
//!
//! 1. **Peer Table** (shared by everything below).
//! 2. **State Synchronizer** owning `SelfState`.
//! 3. **Registration Service**, which echoes the synchronizer's snapshot.
//! 4. **Prober**, which drives registration on every successful probe.
//!
//! [`CellNode::router`] exposes the inbound side over HTTP and
//! [`CellNode::start`] spawns the probe and sync loops.

use axum::{
    Extension, Router,
    routing::{delete, get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::NodeConfig;
use crate::error::ConfigError;
use crate::membership::prober::{ProbeConfig, Prober};
use crate::membership::table::PeerTable;
use crate::registration::handlers::handle_register;
use crate::registration::protocol::ENDPOINT_REGISTER;
use crate::registration::service::RegistrationService;
use crate::registry::hosts::HostRegistry;
use crate::registry::types::NodeIdentity;
use crate::status::handlers::{handle_health, handle_peers, handle_remove_peer, handle_status};
use crate::status::protocol::{ENDPOINT_HEALTH, ENDPOINT_PEER, ENDPOINT_PEERS, ENDPOINT_STATUS};
use crate::sync::handlers::{handle_local_delta, handle_pull, handle_sync};
use crate::sync::protocol::{ENDPOINT_STATE_DELTA, ENDPOINT_SYNC};
use crate::sync::synchronizer::{StateSynchronizer, SyncConfig};
use crate::transport::{HttpPeerClient, PeerClient};

pub struct CellNode {
    pub identity: Arc<NodeIdentity>,
    pub registry: Arc<HostRegistry>,
    pub table: Arc<PeerTable>,
    pub sync: Arc<StateSynchronizer>,
    pub registration: Arc<RegistrationService>,
    pub prober: Arc<Prober>,
}

impl CellNode {
    pub fn new(
        identity: NodeIdentity,
        registry: Arc<HostRegistry>,
        client: Arc<dyn PeerClient>,
        probe: ProbeConfig,
        sync: SyncConfig,
    ) -> Self {
        let table = Arc::new(PeerTable::new(identity.id.clone()));

        let synchronizer = Arc::new(StateSynchronizer::new(
            &identity,
            registry.clone(),
            table.clone(),
            client.clone(),
            sync,
        ));

        let registration = Arc::new(RegistrationService::new(
            identity.clone(),
            registry.clone(),
            table.clone(),
            synchronizer.clone(),
            client.clone(),
            probe.timeout,
        ));

        let prober = Arc::new(Prober::new(
            identity.id.clone(),
            registry.clone(),
            table.clone(),
            registration.clone(),
            client,
            probe,
        ));

        Self {
            identity: Arc::new(identity),
            registry,
            table,
            sync: synchronizer,
            registration,
            prober,
        }
    }

    /// Loads the registry named by `config` and builds a node speaking HTTP.
    pub fn from_config(config: &NodeConfig) -> Result<Self, ConfigError> {
        let registry = HostRegistry::load(&config.node.registry)?;
        let identity = config.local_identity(&registry)?;

        tracing::info!(
            "Loaded registry with {} host(s); local node {} ({:?}) at {}",
            registry.len(),
            identity.id,
            identity.role,
            identity.advertised_address
        );

        Ok(Self::new(
            identity,
            Arc::new(registry),
            Arc::new(HttpPeerClient::new()),
            config.probe_config(),
            config.sync_config(),
        ))
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(ENDPOINT_HEALTH, get(handle_health))
            .route(ENDPOINT_PEERS, get(handle_peers))
            .route(ENDPOINT_PEER, delete(handle_remove_peer))
            .route(ENDPOINT_STATUS, get(handle_status))
            .route(ENDPOINT_REGISTER, post(handle_register))
            .route(ENDPOINT_SYNC, get(handle_pull).post(handle_sync))
            .route(ENDPOINT_STATE_DELTA, post(handle_local_delta))
            .layer(Extension(self.identity.clone()))
            .layer(Extension(self.registry.clone()))
            .layer(Extension(self.table.clone()))
            .layer(Extension(self.sync.clone()))
            .layer(Extension(self.registration.clone()))
    }

    /// Spawns the probe and sync loops.
    pub fn start(&self) -> BackgroundHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let prober = self.prober.clone();
        let probe_rx = shutdown_rx.clone();
        let probe_task = tokio::spawn(async move { prober.run(probe_rx).await });

        let sync = self.sync.clone();
        let sync_task = tokio::spawn(async move { sync.run(shutdown_rx).await });

        BackgroundHandle {
            shutdown_tx,
            tasks: vec![probe_task, sync_task],
        }
    }
}

/// Handle to the background loops of a running node.
pub struct BackgroundHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl BackgroundHandle {
    /// No new rounds start after this; rounds in flight keep running.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Signals shutdown and waits for the loops to finish. Anything still
    /// running after `grace` is aborted.
    pub async fn shutdown(self, grace: Duration) {
        self.request_shutdown();

        let aborts: Vec<_> = self.tasks.iter().map(|task| task.abort_handle()).collect();
        match tokio::time::timeout(grace, futures::future::join_all(self.tasks)).await {
            Ok(_) => tracing::info!("Background loops stopped"),
            Err(_) => {
                tracing::warn!(
                    "Background loops still running after {:?}; aborting",
                    grace
                );
                for abort in aborts {
                    abort.abort();
                }
            }
        }
    }
}
