use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, Request, StatusCode, Uri, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{Span, warn};

use mercado_api::auth::{self, AppState};
use mercado_api::middleware::require_auth;
use mercado_api::{conversations, messages, notifications, relay};
use mercado_gateway::Relay;
use mercado_gateway::connection;
use mercado_types::api::StatusMessage;

#[derive(Clone)]
struct ServerState {
    app: AppState,
    relay: Relay,
}

#[derive(Debug, Deserialize)]
struct WsParams {
    token: Option<String>,
}

/// Assemble every route. `relay` must share its registry with the bridge
/// held by `app_state`.
pub fn build_router(app_state: AppState, relay: Relay) -> Router {
    let state = ServerState {
        app: app_state.clone(),
        relay,
    };

    let public_routes = Router::new()
        .route("/users/register", post(auth::register))
        .route("/users/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/messages", get(messages::list_messages).post(messages::create_message))
        .route("/notifications", get(notifications::list_notifications))
        .route(
            "/notifications/{id}",
            patch(notifications::update_notification).delete(notifications::delete_notification),
        )
        .route(
            "/conversations",
            get(conversations::list_conversations).post(conversations::create_conversation),
        )
        .route("/conversations/{id}", patch(conversations::update_conversation))
        .route("/relay/connected", get(relay::connected_users))
        .route("/relay/broadcast", post(relay::broadcast))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_auth))
        .with_state(app_state);

    let ws_route = Router::new()
        .route("/ws", get(ws_upgrade))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
}

/// Request span without the query string: `/ws?token=` carries a live JWT.
fn request_span(req: &Request<Body>) -> Span {
    tracing::debug_span!(
        "request",
        method = %req.method(),
        path = %loggable_path(req.uri()),
        version = ?req.version(),
    )
}

fn loggable_path(uri: &Uri) -> &str {
    uri.path()
}

/// Relay entry point. The token comes from `?token=` or, failing that, an
/// `Authorization: Bearer` header; no socket is opened without a valid one.
async fn ws_upgrade(
    State(state): State<ServerState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params.token.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
    });

    match state.app.gate.admit(token.as_deref()) {
        Ok(principal) => ws.on_upgrade(move |socket| {
            connection::handle_connection(socket, state.relay, principal)
        }),
        Err(e) => {
            warn!("Relay connection rejected: {}", e);
            (
                StatusCode::UNAUTHORIZED,
                Json(StatusMessage {
                    message: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}
