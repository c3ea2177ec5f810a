//! Ecommerce API server binary.
//!
//! Serves the REST API on port 3000 by default. With `API_DATABASE_URL`
//! set, pending migrations are applied and `PostgreSQL` backs every store;
//! otherwise the in-memory store is used, seeded from `API_SEED_FILE`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use ecommerce_api::clock::SystemClock;
use ecommerce_api::db::{self, Stores, memory::MemoryStore, seed::CatalogSeed};
use ecommerce_api::{ApiConfig, AppState};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ApiConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Pick the store backend from configuration.
async fn init_stores(config: &ApiConfig) -> Stores {
    if let Some(database_url) = &config.database_url {
        let pool = db::create_pool(database_url)
            .await
            .expect("Failed to create database pool");
        tracing::info!("Database pool created");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        tracing::info!("Migrations applied");

        return Stores::postgres(pool);
    }

    let store = match &config.seed_file {
        Some(path) => {
            let seed = CatalogSeed::load(path)
                .await
                .expect("Failed to load catalog seed");
            tracing::info!(
                path = %path.display(),
                products = seed.products.len(),
                "Catalog seed loaded"
            );
            MemoryStore::from_seed(seed)
        }
        None => MemoryStore::new(),
    };
    tracing::warn!("No database configured, using the in-memory store");
    Stores::memory(Arc::new(store))
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = ApiConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ecommerce_api=info,tower_http=info".into());

    let json = config.log_json;
    tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let stores = init_stores(&config).await;
    let state = AppState::new(config.clone(), stores, Arc::new(SystemClock))
        .expect("Failed to initialize application state");

    match state.tokens().load().await {
        Ok(loaded) => tracing::info!(loaded, "Session tokens loaded"),
        Err(e) => tracing::error!(error = %e, "Failed to load session tokens"),
    }
    let _sweeper = state.spawn_sweeper(config.auth.sweep_interval);

    let app = ecommerce_api::app(state);

    let addr = config.socket_addr();
    tracing::info!(base_path = %config.base_path, "ecommerce-api listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
