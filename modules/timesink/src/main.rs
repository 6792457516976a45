use event_bus::{EventBus, InMemoryBus, NatsBus};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use timesink_rs::{
    build_router,
    config::{BusType, Config, EventLogKind},
    db::init_pool,
    metrics::Metrics,
    repos::{EventLog, InMemoryEventLog, PgEventLog},
    start_event_consumer, AppState,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting timesink service...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        "Configuration loaded: role={}, host={}, port={}, bus_type={}, match_policy={}",
        config.role,
        config.host,
        config.port,
        config.bus_type,
        config.match_policy
    );

    let log: Arc<dyn EventLog> = match (config.event_log, config.database_url.as_deref()) {
        (EventLogKind::Postgres, Some(database_url)) => {
            tracing::info!("Connecting to database...");
            let pool = init_pool(database_url)
                .await
                .expect("Failed to connect to database");

            tracing::info!("Running migrations...");
            sqlx::migrate!("./db/migrations")
                .run(&pool)
                .await
                .expect("Failed to run migrations");

            Arc::new(PgEventLog::new(pool))
        }
        (EventLogKind::Postgres, None) => panic!("DATABASE_URL must be set for EVENT_LOG=postgres"),
        (EventLogKind::InMemory, _) => {
            tracing::warn!("Using in-memory event log; events are lost on exit");
            Arc::new(InMemoryEventLog::new())
        }
    };

    let metrics = Metrics::new().expect("Failed to register metrics");
    let state = Arc::new(AppState::from_config(log, metrics, &config));

    let bus: Option<Arc<dyn EventBus>> = match config.bus_type {
        BusType::None => None,
        BusType::InMemory => {
            tracing::info!("Using InMemory event bus");
            Some(Arc::new(InMemoryBus::new()))
        }
        BusType::Nats => {
            tracing::info!("Connecting to NATS at {}", config.nats_url);
            let bus = NatsBus::connect(&config.nats_url)
                .await
                .expect("Failed to connect to NATS");
            Some(Arc::new(bus))
        }
    };

    if let (Some(bus), Some(recorder)) = (bus, state.recorder.clone()) {
        start_event_consumer(bus, recorder, &config.ingest_subject)
            .await
            .expect("Failed to start ingest consumer");
    }

    let app = build_router(state, config.role);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("HOST/PORT do not form a valid socket address");
    tracing::info!("timesink service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
