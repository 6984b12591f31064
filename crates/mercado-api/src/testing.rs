//! Shared fixtures for the HTTP handler tests.

use std::sync::Arc;

use axum::body::to_bytes;
use axum::response::Response;
use chrono::Duration;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc::UnboundedReceiver;

use mercado_db::Database;
use mercado_gateway::bridge::NotificationBridge;
use mercado_gateway::registry::{ConnectionHandle, ConnectionRegistry, Outgoing};
use mercado_types::api::Principal;
use mercado_types::events::ServerEvent;
use mercado_types::models::{Conversation, UserId};

use crate::auth::{AppState, AppStateInner};

pub const SECRET: &str = "test-secret";

/// Empty database with a bridge bound to its own registry.
pub fn app_state() -> (AppState, ConnectionRegistry) {
    let db = Database::open_in_memory().expect("in-memory db");
    state_with(db)
}

fn state_with(db: Database) -> (AppState, ConnectionRegistry) {
    let registry = ConnectionRegistry::new();
    let bridge = NotificationBridge::new();
    bridge.configure(registry.clone());
    let state = AppStateInner::new(Arc::new(db), SECRET.to_string(), Duration::hours(1), bridge);
    (state, registry)
}

pub struct Market {
    pub state: AppState,
    pub registry: ConnectionRegistry,
    pub buyer: UserId,
    pub seller: UserId,
    pub outsider: UserId,
    pub conversation: Conversation,
}

pub fn market() -> Market {
    let db = Database::open_in_memory().expect("in-memory db");
    let buyer = db.create_user("ana@uni.edu", "Ana", "Gomez", "x").expect("buyer");
    let seller = db.create_user("luis@uni.edu", "Luis", "Perez", "x").expect("seller");
    let outsider = db.create_user("eva@uni.edu", "Eva", "Ruiz", "x").expect("outsider");
    let product = db.create_product(seller, "Calculadora").expect("product");
    let conversation = db.create_conversation(product, buyer, seller).expect("conversation");
    let (state, registry) = state_with(db);

    Market {
        state,
        registry,
        buyer,
        seller,
        outsider,
        conversation,
    }
}

pub fn principal(id: UserId) -> Principal {
    Principal {
        id,
        email: format!("user{}@uni.edu", id),
        roles: vec!["student".to_string()],
    }
}

pub async fn connect(registry: &ConnectionRegistry, user_id: UserId) -> UnboundedReceiver<Outgoing> {
    let (conn, rx) = ConnectionHandle::new(principal(user_id));
    registry.register(conn).await;
    rx
}

pub fn drain(rx: &mut UnboundedReceiver<Outgoing>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(Outgoing::Event(event)) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub async fn body_json<T: DeserializeOwned>(res: Response) -> T {
    let bytes = to_bytes(res.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}
