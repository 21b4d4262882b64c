//! HTTP API server for the identity registry.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod error;
mod handlers;
mod routes;

use identity_prover::load_or_setup;
use identity_registry::{
    DirectorySnapshotStore, GatewaySnapshotStore, Groth16Prover, JsonFileStore, Ledger,
    LocalLedger, ReconciliationEngine, RegistryConfig, SnapshotStore,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Application state shared across handlers
pub struct AppState {
    pub engine: ReconciliationEngine,
    pub ledger: Arc<dyn Ledger>,
}

pub type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "registry server stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), BoxError> {
    let config = RegistryConfig::from_env()?;
    info!(?config, "starting identity registry server");

    // Trusted setup is slow; keep it off the runtime threads
    let keys_dir = config.keys_dir.clone();
    let depth = config.engine.depth;
    let keys = tokio::task::spawn_blocking(move || load_or_setup(&keys_dir, depth)).await??;
    let keys = Arc::new(keys);

    let ledger = match &config.ledger_journal {
        Some(path) => LocalLedger::open(path.clone())?,
        None => LocalLedger::new(),
    };
    let ledger: Arc<dyn Ledger> = Arc::new(ledger.with_verifying_key(keys.verifying_key.clone()));

    let mut gateways = config.snapshot_dirs.iter().map(|dir| {
        Arc::new(DirectorySnapshotStore::new(dir.clone())) as Arc<dyn SnapshotStore>
    });
    let primary = gateways.next().ok_or("no snapshot directory configured")?;
    let snapshots = GatewaySnapshotStore::new(primary, gateways.collect(), config.gateway_timeout);

    let engine = ReconciliationEngine::new(
        config.engine.clone(),
        Box::new(JsonFileStore::open(config.data_dir.clone())?),
        ledger.clone(),
        Arc::new(snapshots),
        Arc::new(Groth16Prover::new(keys)),
    )?;

    let state = Arc::new(AppState { engine, ledger });

    let app = Router::new()
        .merge(routes::api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
