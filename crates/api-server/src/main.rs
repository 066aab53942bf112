use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use engine::config::{ApiConfig, EngineConfig};
use engine::ledger::PgLedger;
use engine::llm::{OpenRouterConfig, OpenRouterGateway};
use engine::orchestrator::ChatEngine;
use engine::platform::PlatformRpcClient;
use engine::registry::ToolRegistry;
use engine::skills::builtin_catalog;
use engine::store::PgSessionStore;
use api_server::http;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "api_server=debug,engine=debug,axum=info".to_string()),
        )
        .init();

    let config = match ApiConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read config: {err}");
            std::process::exit(1);
        }
    };
    let engine_config = match EngineConfig::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("failed to read engine config: {err}");
            std::process::exit(1);
        }
    };

    let store =
        match PgSessionStore::connect(&config.database_url, config.database_max_connections).await
        {
            Ok(store) => store,
            Err(err) => {
                error!("failed to connect to postgres: {err}");
                std::process::exit(1);
            }
        };

    let migrator = match sqlx::migrate::Migrator::new(config.migrations_dir.clone()).await {
        Ok(migrator) => migrator,
        Err(err) => {
            error!("failed to load migrations: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = migrator.run(store.pool()).await {
        error!("failed to run migrations: {err}");
        std::process::exit(1);
    }

    let registry = match ToolRegistry::build(builtin_catalog()) {
        Ok(registry) => Arc::new(registry),
        Err(err) => {
            error!("tool registry rejected the catalog: {err}");
            std::process::exit(1);
        }
    };

    let model_gateway = match OpenRouterConfig::from_env().and_then(OpenRouterGateway::new) {
        Ok(gateway) => Arc::new(gateway),
        Err(err) => {
            error!("failed to build model gateway: {err}");
            std::process::exit(1);
        }
    };

    let platform_http_client = match reqwest::Client::builder()
        .timeout(Duration::from_millis(config.platform_rpc_timeout_ms))
        .build()
    {
        Ok(client) => client,
        Err(err) => {
            error!("failed to build platform http client: {err}");
            std::process::exit(1);
        }
    };
    let platform = Arc::new(PlatformRpcClient::new(
        config.platform_rpc_base_url.clone(),
        platform_http_client,
    ));

    let ledger = Arc::new(PgLedger::new(store.pool().clone()));
    let store = Arc::new(store);

    let engine = ChatEngine::new(
        engine_config,
        registry,
        store.clone(),
        ledger,
        model_gateway,
        platform,
    );

    let app = http::build_router(http::AppState { engine, store });

    let addr: SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!("invalid API_BIND_ADDR {}: {err}", config.bind_addr);
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind {addr}: {err}");
            std::process::exit(1);
        }
    };

    info!("api-server listening on {addr}");
    if let Err(err) = axum::serve(listener, app).await {
        error!("server exited with error: {err}");
        std::process::exit(1);
    }
}
