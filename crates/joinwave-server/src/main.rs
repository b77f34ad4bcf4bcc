mod config;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "joinwave=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    info!(
        "Wave defaults: window={}s threshold={}",
        config.waves.window_seconds, config.waves.threshold
    );

    // Init database
    let db = Arc::new(joinwave_db::Database::open(&config.db_path)?);

    let shutdown = CancellationToken::new();
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let state = AppState {
        db,
        config: Arc::new(config),
        shutdown: shutdown.clone(),
    };

    let app = routes::router(state).layer(TraceLayer::new_for_http());

    info!("joinwave listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested, cancelling in-flight scans");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
