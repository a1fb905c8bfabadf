use actix_web::{web, App, HttpServer};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod allocation;
mod auth;
mod config;
mod credentials;
mod domain;
mod error;
mod health;
mod http;
mod identity;
mod metrics;
mod persistence;
mod registration;
mod utils;

use config::{AppConfig, StorageBackend};
use http::AppState;
use identity::HttpIdentityRegistry;
use persistence::{CustomerStore, InMemoryCustomerStore, PgCustomerStore};

#[derive(Parser, Debug)]
#[command(name = "card-onboarding", version, about = "Customer onboarding and card issuance service")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "ONBOARDING_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen port from the config file
    #[arg(long)]
    port: Option<u16>,

    /// Mark the access-token cookie Secure
    #[arg(long)]
    secure_cookies: bool,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO level, overridable with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,card_onboarding=debug"))
        )
        .init();

    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing::info!(
        config_file = ?args.config,
        storage = ?config.storage.backend,
        registry = %config.identity_registry.base_url,
        "Starting card onboarding service"
    );

    // === 1. Metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);

    // === 2. Customer store ===
    let store: Arc<dyn CustomerStore> = match config.storage.backend {
        StorageBackend::Postgres => {
            let store = PgCustomerStore::connect(
                &config.storage.database_url,
                config.storage.max_connections,
            )
            .await?;
            store.init_schema().await?;
            Arc::new(store)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory customer store, data is lost on restart");
            Arc::new(InMemoryCustomerStore::new())
        }
    };

    // === 3. Identity registry client (retry + circuit breaker) ===
    let registry = Arc::new(HttpIdentityRegistry::new(&config.identity_registry, metrics.clone())?);

    // === 4. Services and HTTP server ===
    let state = web::Data::new(
        AppState::build(&config, store, registry, metrics)?.with_secure_cookies(args.secure_cookies),
    );

    let bind = (config.server.host.clone(), config.server.port);
    tracing::info!(host = %bind.0, port = bind.1, "HTTP server listening");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(http::configure)
    })
    .bind(bind)?
    .run()
    .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
