use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::error;

use mercado_db::Database;

use crate::registry::ConnectionRegistry;

/// Everything a relay handler needs: storage and the connection registry.
/// Constructed once at startup and cloned into every connection.
#[derive(Clone)]
pub struct Relay {
    db: Arc<Database>,
    registry: ConnectionRegistry,
}

impl Relay {
    pub fn new(db: Arc<Database>, registry: ConnectionRegistry) -> Self {
        Self { db, registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Run a blocking storage call off the async runtime. No registry lock is
    /// held while this is pending.
    pub async fn storage<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                anyhow!("storage task failed: {}", e)
            })?
    }
}
