//! Database pool construction and migrations

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::{str::FromStr, time::Duration};

/// PgBouncer in transaction mode cannot serve prepared statements, so the
/// statement cache is disabled on every connection
fn connect_options(database_url: &str) -> Result<PgConnectOptions, sqlx::Error> {
    Ok(PgConnectOptions::from_str(database_url)?.statement_cache_capacity(0))
}

/// Create the serving pool. `max_connections` comes from deployment config so
/// several instances can share a hosted Postgres session-mode pool.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(clamp_pool_size(max_connections))
        .min_connections(0)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(60))
        .max_lifetime(Duration::from_secs(300))
        .connect_with(connect_options(database_url)?)
        .await
}

/// Single-connection pool for running migrations, with a long acquire timeout
/// since a concurrently-deploying instance may hold the migration lock
pub async fn create_migration_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(120))
        .connect_with(connect_options(database_url)?)
        .await
}

/// A misconfigured zero would produce a pool that can never serve a query
fn clamp_pool_size(max_connections: u32) -> u32 {
    max_connections.max(1)
}

/// Apply pending migrations from the workspace `migrations/` directory
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_size_floor() {
        assert_eq!(clamp_pool_size(0), 1);
        assert_eq!(clamp_pool_size(5), 5);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_create_pool() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url, 2).await.expect("Failed to create pool");
        assert!(pool.size() > 0);
    }
}
