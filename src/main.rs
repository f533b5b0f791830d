use callbroker::application::{BrokerSettings, IntentProcessor, ProviderConnection, SessionBroker};
use callbroker::config::Config;
use callbroker::domain::account::{Account, AccountRegistry};
use callbroker::domain::identity::{CallerIdentity, IdentityResolver};
use callbroker::domain::shared::value_objects::{AccountHandle, SCHEME_SIP, SCHEME_TEL};
use callbroker::infrastructure::audio::TracingAudioCoordinator;
use callbroker::infrastructure::identity::DirectoryResolver;
use callbroker::infrastructure::metrics::init_metrics;
use callbroker::infrastructure::provider::{LoopbackProvider, LoopbackSettings};
use callbroker::interface::api::{build_router, AppState};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const LOOPBACK_PROVIDER: &str = "loopback";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting callbroker");
    info!("Configuration loaded: {:?}", config);

    let prometheus_handle = init_metrics()?;

    let directory = Arc::new(DirectoryResolver::new());
    directory
        .insert("650-555-2323", CallerIdentity::named("Alice"))
        .await;

    let identity: Arc<dyn IdentityResolver> = directory;

    let broker = SessionBroker::spawn(
        BrokerSettings::from(&config.broker),
        Arc::new(TracingAudioCoordinator),
        Some(identity),
    );

    let connection = ProviderConnection::new(LOOPBACK_PROVIDER);
    let loopback = Arc::new(LoopbackProvider::new(
        connection.clone(),
        LoopbackSettings::default(),
    ));
    broker.bind_provider(connection, loopback).await?;
    info!("Loopback provider bound");

    let accounts = Arc::new(AccountRegistry::new());
    register_demo_accounts(&accounts)?;

    let intents = IntentProcessor::new(
        accounts,
        broker.clone(),
        config.broker.default_scheme.clone(),
    );
    let app = build_router(AppState::new(broker.clone(), intents), prometheus_handle);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP API listening on http://{}", addr);
    info!("  GET  /health, /metrics, /accounts, /calls");
    info!("  POST /accounts, /calls, /calls/incoming");
    info!("  WS   /ws (controller)");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down...");
        })
        .await?;

    broker.shutdown();
    Ok(())
}

fn register_demo_accounts(accounts: &AccountRegistry) -> anyhow::Result<()> {
    let line = AccountHandle::new(LOOPBACK_PROVIDER, "line1");
    accounts.register(Account::new(line.clone(), "Line 1").with_schemes([SCHEME_TEL]));
    accounts.register(
        Account::new(AccountHandle::new(LOOPBACK_PROVIDER, "sip"), "SIP").with_schemes([SCHEME_SIP]),
    );
    accounts.set_default_outgoing(&line)?;
    info!("Registered {} demo accounts", accounts.count());
    Ok(())
}
