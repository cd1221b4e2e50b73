use anyhow::Result;
use ci_report_server::config::Config;
use ci_report_server::state::AppState;
use ci_report_server::{api, db};
use moka::future::Cache;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Load Config
    let config = Config::new().expect("Failed to load config");
    let config = Arc::new(config);

    // Initialize DB
    let db = db::init_db(&config.database.url)
        .await
        .expect("Failed to initialize database");

    let report_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM report")
        .fetch_one(&db)
        .await
        .unwrap_or(0);
    info!("Database ready: {} reports on record", report_count);

    let ttl = config.cache.ttl_seconds.unwrap_or(60);
    let capacity = config.cache.capacity.unwrap_or(1_000);

    let state = AppState {
        db,
        config: config.clone(),
        cache: Cache::builder()
            .time_to_live(std::time::Duration::from_secs(ttl))
            .max_capacity(capacity)
            .build(),
    };

    // Start Web Server
    let app = api::app_router(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Server running on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
