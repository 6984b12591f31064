use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{RwLock, mpsc};
use tracing::trace;
use uuid::Uuid;

use mercado_types::api::Principal;
use mercado_types::events::ServerEvent;
use mercado_types::models::UserId;

/// An item queued for a single connection's writer task.
#[derive(Debug, Clone)]
pub enum Outgoing {
    Event(ServerEvent),
    /// Free-form `{type, data}` frame, used for system-wide broadcasts.
    Custom { event_type: String, data: Value },
}

impl Outgoing {
    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            Self::Event(event) => serde_json::to_string(event),
            Self::Custom { event_type, data } => serde_json::to_string(&serde_json::json!({
                "type": event_type,
                "data": data,
            })),
        }
    }
}

/// Handle to one live connection: its principal and its outbound FIFO queue.
///
/// The queue's receiving half belongs to the connection's writer task. Once
/// that task ends the handle reports itself closed and every push fails.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    principal: Arc<Principal>,
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl ConnectionHandle {
    pub fn new(principal: Principal) -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            conn_id: Uuid::new_v4(),
            principal: Arc::new(principal),
            tx,
        };
        (handle, rx)
    }

    pub fn id(&self) -> Uuid {
        self.conn_id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> UserId {
        self.principal.id
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue an event. Returns false if the connection is already gone.
    pub fn push(&self, event: ServerEvent) -> bool {
        self.push_outgoing(Outgoing::Event(event))
    }

    pub fn push_outgoing(&self, item: Outgoing) -> bool {
        self.tx.send(item).is_ok()
    }
}

/// Tracks live connections by user. Cheap to clone; all clones share state.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    /// user_id -> (conn_id -> handle)
    connections: Arc<RwLock<HashMap<UserId, HashMap<Uuid, ConnectionHandle>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection under its principal's user id. A user may hold any
    /// number of connections at once.
    pub async fn register(&self, conn: ConnectionHandle) {
        self.connections
            .write()
            .await
            .entry(conn.user_id())
            .or_default()
            .insert(conn.id(), conn);
    }

    /// Remove a connection. Returns false if it was not registered.
    pub async fn unregister(&self, conn: &ConnectionHandle) -> bool {
        let mut connections = self.connections.write().await;
        let Some(user_conns) = connections.get_mut(&conn.user_id()) else {
            return false;
        };
        let removed = user_conns.remove(&conn.id()).is_some();
        if user_conns.is_empty() {
            connections.remove(&conn.user_id());
        }
        removed
    }

    /// Apply `f` to every open connection whose principal satisfies
    /// `predicate`. Closed connections are skipped, never visited.
    /// Returns how many invocations of `f` reported success.
    pub async fn for_each_matching<P, F>(&self, predicate: P, mut f: F) -> usize
    where
        P: Fn(&Principal) -> bool,
        F: FnMut(&ConnectionHandle) -> bool,
    {
        let connections = self.connections.read().await;
        let mut hits = 0;
        for conn in connections.values().flat_map(|c| c.values()) {
            if conn.is_open() && predicate(conn.principal()) && f(conn) {
                hits += 1;
            }
        }
        hits
    }

    /// Push an event to every open connection of one user. Returns the number
    /// of connections it was queued on; zero when the user is offline.
    pub async fn send_to_user(&self, user_id: UserId, event: ServerEvent) -> usize {
        let connections = self.connections.read().await;
        let Some(user_conns) = connections.get(&user_id) else {
            trace!("{} for user {} dropped: offline", event.kind(), user_id);
            return 0;
        };
        user_conns
            .values()
            .filter(|conn| conn.is_open())
            .filter(|conn| conn.push(event.clone()))
            .count()
    }

    /// Push to every open connection regardless of identity.
    pub async fn broadcast(&self, item: Outgoing) -> usize {
        self.for_each_matching(|_| true, |conn| conn.push_outgoing(item.clone()))
            .await
    }

    /// De-duplicated, sorted ids of users with at least one open connection.
    pub async fn connected_user_ids(&self) -> Vec<UserId> {
        let connections = self.connections.read().await;
        connections
            .iter()
            .filter(|(_, conns)| conns.values().any(ConnectionHandle::is_open))
            .map(|(user_id, _)| *user_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Number of open connections across all users.
    pub async fn connection_count(&self) -> usize {
        self.connections
            .read()
            .await
            .values()
            .flat_map(|c| c.values())
            .filter(|conn| conn.is_open())
            .count()
    }
}
