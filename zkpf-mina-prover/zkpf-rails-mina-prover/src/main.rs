//! zkpf-rails-mina-prover service entry point.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zkpf_mina_prover::{GraphQLChainClient, ProverConfig, ProverState, TxProver, WorkerProcess};
use zkpf_rails_mina_prover::{app_router, AppState};

const DEFAULT_PORT: u16 = 3003;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "zkpf_rails_mina_prover=info,zkpf_mina_prover=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ProverConfig::from_env()?;
    let worker = WorkerProcess::new(config.worker_command.clone())
        .context("ZKPF_PROVER_WORKER must be set")?;
    let worker = Arc::new(worker);
    let chain = Arc::new(GraphQLChainClient::new(config.graphql_url.clone()));

    tracing::info!(
        network = %config.network,
        cache_dir = %config.cache_dir.display(),
        timeout_secs = ?config.proof_timeout.map(|t| t.as_secs()),
        "prover configured"
    );

    let prover = TxProver::new(
        Arc::new(ProverState::new()),
        chain,
        worker.clone(),
        worker,
        config,
    );
    let app = app_router(AppState::new(Arc::new(prover)));

    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
