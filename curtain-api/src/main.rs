use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use curtain_api::{app, worker, AppState, AuthConfig, EngineParts};
use curtain_booking::{HoldPolicyKind, HoldRules};
use curtain_catalog::{CatalogRepository, InMemoryCatalog};
use curtain_core::{Clock, EventPublisher, SeatLedger, SystemClock};
use curtain_store::{Config, DbClient, MemoryLedger, PgLedger, RedisLedger, StorageBackend};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "curtain_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Curtain API on port {}", config.server.port);

    // Storage backend. Postgres may override the holding rules.
    let mut holding_config = config.holding.clone();
    let ledger: Arc<dyn SeatLedger> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryLedger::new()),
        StorageBackend::Redis => Arc::new(
            RedisLedger::new(&config.redis.url, holding_config.retention_seconds)
                .await
                .context("Failed to connect to Redis")?,
        ),
        StorageBackend::Postgres => {
            let db = DbClient::new(&config.database.url)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            holding_config = db
                .fetch_holding_rules(holding_config)
                .await
                .context("Failed to read business rules")?;
            Arc::new(PgLedger::new(db))
        }
    };
    tracing::info!(backend = ?config.storage.backend, "Seat ledger ready");

    let catalog: Arc<dyn CatalogRepository> = match &config.catalog.path {
        Some(path) => Arc::new(InMemoryCatalog::from_path(path).with_context(|| format!("Failed to load catalog {}", path))?),
        None => Arc::new(InMemoryCatalog::sample()),
    };

    let policy: HoldPolicyKind = holding_config.policy.parse().map_err(anyhow::Error::msg)?;
    let rules = HoldRules {
        ttl: holding_config.ttl(),
        max_party_size: holding_config.max_party_size,
    };
    tracing::info!(
        ttl_secs = holding_config.ttl_seconds,
        max_party_size = rules.max_party_size,
        policy = ?policy,
        "Holding rules loaded"
    );

    let sinks = event_sinks(&config)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState::assemble(EngineParts {
        catalog,
        ledger: ledger.clone(),
        clock: clock.clone(),
        sinks,
        rules,
        policy,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
    })
    .context("Failed to register metrics")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = worker::start_expiry_sweeper(ledger, state.publisher.clone(), clock, &holding_config, shutdown_rx);

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;
    Ok(())
}

#[cfg(feature = "kafka")]
fn event_sinks(config: &Config) -> anyhow::Result<Vec<Arc<dyn EventPublisher>>> {
    if !config.kafka.enabled {
        return Ok(Vec::new());
    }
    let producer = curtain_store::EventProducer::new(&config.kafka.brokers).context("Failed to create Kafka producer")?;
    tracing::info!(brokers = %config.kafka.brokers, "Publishing booking events to Kafka");
    let sink: Arc<dyn EventPublisher> = Arc::new(producer);
    Ok(vec![sink])
}

#[cfg(not(feature = "kafka"))]
fn event_sinks(config: &Config) -> anyhow::Result<Vec<Arc<dyn EventPublisher>>> {
    if config.kafka.enabled {
        tracing::warn!("kafka.enabled is set but this build lacks the `kafka` feature");
    }
    Ok(Vec::new())
}
