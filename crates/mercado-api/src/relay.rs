use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

use mercado_types::api::{BroadcastRequest, BroadcastResponse, ConnectedUsersResponse, Principal};

use crate::auth::AppState;

const ADMIN_ROLE: &str = "admin";

/// Users with at least one live relay connection.
pub async fn connected_users(State(state): State<AppState>) -> impl IntoResponse {
    let user_ids = state.bridge.connected_user_ids().await;
    Json(ConnectedUsersResponse {
        count: user_ids.len(),
        user_ids,
    })
}

/// Push a `{type, data}` frame to every live connection. Admins only.
pub async fn broadcast(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<BroadcastRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if !principal.roles.iter().any(|role| role == ADMIN_ROLE) {
        warn!("{} ({}) attempted a relay broadcast", principal.email, principal.id);
        return Err(StatusCode::FORBIDDEN);
    }
    if req.event_type.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let connections = state.bridge.broadcast_all(&req.event_type, req.data).await;
    info!(
        "{} broadcast '{}' to {} connections",
        principal.email, req.event_type, connections
    );
    Ok(Json(BroadcastResponse { connections }))
}
