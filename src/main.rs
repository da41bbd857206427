use anyhow::Context;
use pricedrop::{api, config::Config, db::init_db, ListingStore, Repository, SystemClock};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("Configuration error")?;

    let pool = init_db(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    let store: Arc<dyn ListingStore> = Arc::new(Repository::new(pool));
    let state = api::AppState::new(store, Arc::new(SystemClock), &config);
    let app = api::create_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!(
        decay_rate_per_hour = %config.default_decay_rate_per_hour,
        lock_timeout_ms = config.purchase_lock_timeout.as_millis() as u64,
        "Server listening on {}",
        addr
    );

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
