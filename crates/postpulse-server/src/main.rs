mod api;
mod export;
mod middleware;

use std::sync::Arc;

use postpulse_core::{load_selectors_if_present, SelectorConfig, StoreBackend};
use postpulse_db::{CachePolicy, DocumentStore, MemoryStore, PgStore, PostCache};
use postpulse_scraper::BrowserScrapeService;
use tracing_subscriber::EnvFilter;

use crate::api::{build_app, AppState, RequestLimits};
use crate::export::JsonExporter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = postpulse_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let store: Arc<dyn DocumentStore> = match config.store {
        StoreBackend::Postgres => {
            let pool = postpulse_db::connect_pool_from_config(&config).await?;
            let applied = postpulse_db::run_migrations(&pool).await?;
            tracing::info!(applied, "database migrations complete");
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("using the in-memory store; cached posts are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let selectors = match load_selectors_if_present(&config.selectors_path)? {
        Some(selectors) => selectors,
        None => {
            tracing::warn!(
                path = %config.selectors_path.display(),
                "selectors file not found, using built-in selectors"
            );
            SelectorConfig::default()
        }
    };

    let state = AppState {
        cache: Arc::new(PostCache::new(store, CachePolicy::from_app_config(&config))),
        scraper: Arc::new(BrowserScrapeService::from_config(
            &config,
            Arc::new(selectors),
        )),
        limits: RequestLimits::from_app_config(&config),
        exporter: config
            .export_dir
            .clone()
            .map(|dir| Arc::new(JsonExporter::new(dir))),
    };
    let app = build_app(state);

    tracing::info!(
        addr = %config.bind_addr,
        env = %config.env,
        store = %config.store,
        max_browser_sessions = config.max_browser_sessions,
        "starting scraper service"
    );
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
