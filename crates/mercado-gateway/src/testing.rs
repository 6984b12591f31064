//! Shared fixtures for the relay's unit tests.

use std::sync::Arc;

use jsonwebtoken::{EncodingKey, Header, encode};
use tokio::sync::mpsc::UnboundedReceiver;

use mercado_db::Database;
use mercado_types::api::{Claims, Principal};
use mercado_types::events::ServerEvent;
use mercado_types::models::{Conversation, UserId};

use crate::registry::{ConnectionHandle, ConnectionRegistry, Outgoing};
use crate::relay::Relay;

pub const SECRET: &str = "test-secret";

pub fn principal(id: UserId) -> Principal {
    Principal {
        id,
        email: format!("user{}@uni.edu", id),
        roles: vec!["student".to_string()],
    }
}

pub fn token(id: UserId) -> String {
    token_expiring_in(id, 3600)
}

pub fn token_expiring_in(id: UserId, secs: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        id,
        email: format!("user{}@uni.edu", id),
        roles: vec!["student".to_string()],
        iat: now as usize,
        exp: (now + secs) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes()))
        .expect("encode test token")
}

/// Buyer and seller with one conversation about one product.
pub struct Market {
    pub relay: Relay,
    pub buyer: UserId,
    pub seller: UserId,
    pub conversation: Conversation,
}

pub fn market() -> Market {
    let db = Database::open_in_memory().expect("in-memory db");
    let buyer = db.create_user("ana@uni.edu", "Ana", "Gomez", "x").expect("buyer");
    let seller = db.create_user("luis@uni.edu", "Luis", "Perez", "x").expect("seller");
    let product = db.create_product(seller, "Calculadora").expect("product");
    let conversation = db.create_conversation(product, buyer, seller).expect("conversation");

    Market {
        relay: Relay::new(Arc::new(db), ConnectionRegistry::new()),
        buyer,
        seller,
        conversation,
    }
}

/// Register a fresh connection for `user_id` on the relay.
pub async fn connect(relay: &Relay, user_id: UserId) -> (ConnectionHandle, UnboundedReceiver<Outgoing>) {
    let (conn, rx) = ConnectionHandle::new(principal(user_id));
    relay.registry().register(conn.clone()).await;
    (conn, rx)
}

/// Drain every typed event currently queued.
pub fn drain(rx: &mut UnboundedReceiver<Outgoing>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(item) = rx.try_recv() {
        if let Outgoing::Event(event) = item {
            events.push(event);
        }
    }
    events
}
