//! Prosthetics Store HTTP server

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prosthetics_store::api::{self, AppState, SERVICE_NAME};
use prosthetics_store::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("loading configuration")?;
    let db = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("connecting to postgres")?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match config.nats_url.as_deref() {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(%url, error = %e, "NATS unavailable, events will not be published");
                None
            }
        },
        None => None,
    };

    let port = config.port;
    let app = api::router(AppState::new(db, nats, config));

    tracing::info!(service = SERVICE_NAME, "listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(("0.0.0.0", port)).await?, app).await?;
    Ok(())
}
