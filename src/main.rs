use anyhow::Context;
use cell_mesh::config::{ENV_CONFIG, NodeConfig};
use cell_mesh::node::CellNode;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = std::env::var(ENV_CONFIG).ok().map(PathBuf::from);

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let path = args
                    .get(i + 1)
                    .context("--config requires a path")?;
                config_path = Some(PathBuf::from(path));
                i += 2;
            }
            "--help" | "-h" => {
                eprintln!("Usage: {} [--config <node.toml>]", args[0]);
                eprintln!("Example: {} --config config/alpha.toml", args[0]);
                eprintln!(
                    "Example: CELL_ID=nous CELL_REGISTRY=config/hosts.toml {}",
                    args[0]
                );
                return Ok(());
            }
            _ => {
                i += 1;
            }
        }
    }

    // 1. Configuration and registry (fatal on error):
    let config = NodeConfig::load(config_path.as_deref()).context("invalid node configuration")?;
    let node = CellNode::from_config(&config).context("failed to load host registry")?;
    let bind_addr = config.bind_addr(&node.identity)?;

    tracing::info!(
        "Starting cell {} ({:?}), advertising {}",
        node.identity.id,
        node.identity.role,
        node.identity.advertised_address
    );

    // 2. Probe and sync loops:
    let background = node.start();

    // 3. HTTP server:
    let app = node.router();
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("HTTP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 4. Let in-flight probes and syncs finish:
    tracing::info!("Shutting down background loops");
    background.shutdown(config.shutdown_grace()).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
