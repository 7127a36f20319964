use std::sync::Arc;

use anyhow::Result;

use crate::{
    aliases::DbPool,
    api::{
        blob_store::{BlobStore, LocalBlobStore},
        tokens::TokenIssuer,
    },
    config::AppConfig,
    db,
};

/// Shared per-process state. The database is the only mutable resource behind it.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub tokens: Arc<TokenIssuer>,
    pub blob_store: Arc<dyn BlobStore>,
}

impl AppState {
    pub fn new(db_pool: DbPool, tokens: TokenIssuer, blob_store: Arc<dyn BlobStore>) -> Self {
        Self {
            db_pool,
            tokens: Arc::new(tokens),
            blob_store,
        }
    }

    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let db_pool = db::create_pool(&config.database).await?;

        Ok(Self::new(
            db_pool,
            TokenIssuer::from_config(&config.auth),
            Arc::new(LocalBlobStore::from_config(&config.media)),
        ))
    }
}
