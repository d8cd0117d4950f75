use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auditchain::anchor::{AnchorClient, AnchorPolicy, InMemoryLedger, JsonRpcLedger, LedgerBackend};
use auditchain::api::{self, AppState};
use auditchain::batch::BatchBuilder;
use auditchain::config::AppConfig;
use auditchain::store::Store;
use auditchain::verify::VerificationEngine;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auditchain=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting AuditChain");

    let config = AppConfig::load()?;
    info!("Configuration loaded");

    let store = Store::connect(&config.database_url).await?;
    info!("Store connected");

    let ledger = match &config.ledger.rpc_url {
        Some(url) => LedgerBackend::Rpc(JsonRpcLedger::new(
            url.clone(),
            config.ledger.rpc_timeout(),
        )?),
        None => {
            info!("No LEDGER_RPC_URL configured, using in-memory ledger");
            LedgerBackend::Memory(InMemoryLedger::new())
        }
    };

    let policy = AnchorPolicy {
        confirmation_depth: config.ledger.confirmation_depth,
        poll_interval: config.ledger.poll_interval(),
        confirm_timeout: config.ledger.confirm_timeout(),
        max_submit_attempts: config.ledger.max_submit_attempts,
        ..AnchorPolicy::default()
    };

    let batcher = BatchBuilder::new(store.clone(), config.batch_size_limit);
    let anchors = AnchorClient::new(store.clone(), ledger.clone(), policy);
    let verifier = VerificationEngine::new(store.clone(), ledger);

    let addr = SocketAddr::new(config.server_host.parse()?, config.server_port);
    let state = Arc::new(AppState {
        config,
        store,
        batcher,
        anchors,
        verifier,
    });

    let app = api::router(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
