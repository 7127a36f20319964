use anyhow::Result;
use sello_backend::{app_state::AppState, bootstrap, config, db, routes};

#[tokio::main]
async fn main() -> Result<()> {
    bootstrap::init_tracing();
    bootstrap::init_env();

    let config = config::load()?;

    tracing::info!("Running migrations...");
    let migrations_count = db::run_migrations_blocking(db::MIGRATIONS, &config.database.url).await?;
    tracing::info!("Run {} new migrations successfully", migrations_count);

    let state = AppState::from_config(&config).await?;
    let app = routes::app(state);

    tracing::info!("Bootstrapping...");
    bootstrap::serve("Sello", app, &config.server).await
}
