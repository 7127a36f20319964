use anyhow::{Context, Result, anyhow};
use diesel::{Connection, PgConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use crate::{
    aliases::{DbConnectionManager, DbPool},
    config::DatabaseConfig,
};

/// Migrations embedded into the binary which helps with streamlining image building process
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Builds the async connection pool. Connections are opened lazily.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let manager = DbConnectionManager::new(&config.url);
    let pool = DbPool::builder()
        .max_size(config.max_connections)
        .build(manager)
        .await
        .context("Failed to build the database pool")?;

    Ok(pool)
}

/// Runs pending migrations on a dedicated blocking thread and returns how many were applied.
pub async fn run_migrations_blocking(
    migrations: EmbeddedMigrations,
    database_url: &str,
) -> Result<usize> {
    let database_url = database_url.to_string();

    tokio::task::spawn_blocking(move || {
        let mut conn = PgConnection::establish(&database_url)
            .context("Failed to connect to the database for migrations")?;

        let applied = conn
            .run_pending_migrations(migrations)
            .map_err(|err| anyhow!("Failed to run migrations: {err}"))?;

        Ok(applied.len())
    })
    .await
    .context("Migration task panicked")?
}
