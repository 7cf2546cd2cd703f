use anyhow::Context;
use clap::Parser;
use planningpoker::{config::Config, db, router, AppState};
use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("planningpoker=info,tower_http=info")),
        )
        .init();

    let config = Config::parse();

    let db_pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;
    db::init(&db_pool).await.map_err(|err| err.0)?;

    let app = router(AppState::new(db_pool, config.broadcast_capacity));

    let listener = tokio::net::TcpListener::bind(config.addr())
        .await
        .with_context(|| format!("binding {}", config.addr()))?;
    info!(addr = %config.addr(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
