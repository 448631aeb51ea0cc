//! Quill API server binary

use anyhow::Context;
use quill_api::{routes::create_router, AppState, Config};
use quill_billing::StripeClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real deployments set the environment directly
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;

    let migration_pool = quill_shared::db::create_migration_pool(&config.database_url)
        .await
        .context("Failed to connect to database for migrations")?;
    quill_shared::db::run_migrations(&migration_pool)
        .await
        .context("Failed to run migrations")?;
    migration_pool.close().await;

    let pool = quill_shared::db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to create database pool")?;

    let stripe = StripeClient::from_env().context("Failed to configure Stripe client")?;

    let bind_address = config.bind_address.clone();
    let state = AppState::new(pool, config, stripe);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    tracing::info!(address = %bind_address, "Quill API listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
