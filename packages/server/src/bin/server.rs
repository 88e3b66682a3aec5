//! CONSIA gateway server.
//!
//! Room broadcast hub plus the AI, voice, admin and vault endpoints.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin consia-server
//! cargo run --bin consia-server -- --config consia.yaml --host 0.0.0.0 --port 3000
//! cargo run --bin consia-server --features redis-store -- --config consia.yaml
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use consia_server::{
    config::{AppConfig, StoreBackend},
    domain::KeyValueStore,
    infrastructure::{InMemoryStore, OpenAiClient},
    ui::{AppState, Server},
};
use consia_shared::{
    logger::setup_logger,
    time::{Clock, SystemClock},
};

/// Period of in-process housekeeping (rate limiter sweep, expired keys)
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "consia-server")]
#[command(about = "CONSIA room hub and AI gateway", long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Host address to bind the server to (overrides the config file)
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port number to bind the server to (overrides the config file)
    #[arg(short = 'p', long)]
    port: Option<u16>,
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn KeyValueStore>, String> {
    match config.store.backend {
        StoreBackend::Memory => {
            let store = Arc::new(InMemoryStore::new());
            let sweeper = store.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(HOUSEKEEPING_INTERVAL);
                loop {
                    ticker.tick().await;
                    let purged = sweeper.purge_expired().await;
                    if purged > 0 {
                        tracing::debug!(purged, "Purged expired keys");
                    }
                }
            });
            Ok(store)
        }
        #[cfg(feature = "redis-store")]
        StoreBackend::Redis => {
            let url = config
                .store
                .redis_url
                .as_deref()
                .ok_or_else(|| "store.redis_url is not set".to_string())?;
            let store =
                consia_server::infrastructure::store::RedisStore::connect(url, &config.store.namespace)
                    .await
                    .map_err(|e| e.to_string())?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis-store"))]
        StoreBackend::Redis => {
            Err("the redis backend needs a build with the `redis-store` feature".to_string())
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    setup_logger(env!("CARGO_BIN_NAME"), "debug");

    let args = Args::parse();

    // Initialize dependencies in order:
    // 1. Configuration
    // 2. Key-value store
    // 3. Provider client
    // 4. AppState (ledger, audit log, room hub, UseCases, middleware)
    // 5. Server

    // 1. Configuration
    let mut config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if config.auth.owner_secret.is_none() {
        tracing::warn!("No owner secret configured; admin and vault routes are unreachable");
    }

    // 2. Key-value store
    let store = match open_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open {:?} store: {}", config.store.backend, e);
            std::process::exit(1);
        }
    };
    tracing::info!(backend = ?config.store.backend, "Key-value store ready");

    // 3. Provider client (AI + speech)
    let provider = match OpenAiClient::new(config.openai_settings()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("Failed to build provider client: {}", e);
            std::process::exit(1);
        }
    };
    if config.provider.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; provider routes will fail");
    }

    // 4. AppState
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (state, _audit_task) =
        AppState::from_config(&config, store, provider.clone(), provider, clock);
    let state = Arc::new(state);

    if let Some(limiter) = state.rate_limiter.clone() {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HOUSEKEEPING_INTERVAL);
            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        });
    }

    // 5. Create and run the server
    let server = Server::new(state);
    if let Err(e) = server.run(&config.server.host, config.server.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
