pub mod auth;
pub mod conversations;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod relay;

#[cfg(test)]
pub(crate) mod testing;

use axum::http::StatusCode;
use tracing::error;

use mercado_db::Database;

pub use auth::{AppState, AppStateInner};

/// Run a blocking storage call off the async runtime, mapping any failure
/// to a 500.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("Storage error: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}
