//! Outbound notification bridge.
//!
//! HTTP-path code uses this to push notifications to connected users
//! without holding the connection registry itself. The registry is bound
//! once at startup with [`NotificationBridge::configure`]; until then every
//! push is a logged no-op.

use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock, OnceLock};

use serde_json::Value;
use tracing::{debug, info, warn};

use mercado_types::events::ServerEvent;
use mercado_types::models::{Notification, UserId};

use crate::registry::{ConnectionRegistry, Outgoing};

static GLOBAL: LazyLock<NotificationBridge> = LazyLock::new(NotificationBridge::new);

/// Process-wide bridge instance.
pub fn global() -> &'static NotificationBridge {
    &GLOBAL
}

/// Outcome of a targeted push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Distinct user ids asked for.
    pub requested: usize,
    /// Of those, how many had at least one connection that took the event.
    pub delivered: usize,
    /// Total connections the event was queued on.
    pub connections: usize,
}

#[derive(Clone, Default)]
pub struct NotificationBridge {
    registry: Arc<OnceLock<ConnectionRegistry>>,
}

impl NotificationBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the live registry. Only the first call takes effect.
    pub fn configure(&self, registry: ConnectionRegistry) -> bool {
        if self.registry.set(registry).is_err() {
            warn!("Notification bridge already configured, ignoring");
            return false;
        }
        info!("Notification bridge configured");
        true
    }

    fn registry(&self) -> Option<&ConnectionRegistry> {
        let registry = self.registry.get();
        if registry.is_none() {
            warn!("Notification bridge not configured, dropping push");
        }
        registry
    }

    /// Push `notification` as `newNotification` to every live connection of
    /// the given users. Accepts a single id (`[id]`) or any collection;
    /// duplicates are ignored.
    pub async fn notify_users<I>(&self, user_ids: I, notification: &Notification) -> Delivery
    where
        I: IntoIterator<Item = UserId>,
    {
        let targets: BTreeSet<UserId> = user_ids.into_iter().collect();
        let mut delivery = Delivery {
            requested: targets.len(),
            ..Delivery::default()
        };
        let Some(registry) = self.registry() else {
            return delivery;
        };

        let mut reached = BTreeSet::new();
        delivery.connections = registry
            .for_each_matching(
                |principal| targets.contains(&principal.id),
                |conn| {
                    let pushed = conn.push(ServerEvent::NewNotification(notification.clone()));
                    if pushed {
                        reached.insert(conn.user_id());
                    }
                    pushed
                },
            )
            .await;
        delivery.delivered = reached.len();

        info!(
            "Notification {} emitted to {}/{} users ({} connections): {:?}",
            notification.id, delivery.delivered, delivery.requested, delivery.connections, targets
        );
        delivery
    }

    /// Push a free-form `{type, data}` frame to every live connection.
    /// Administrative use only; no identity filtering is applied.
    pub async fn broadcast_all(&self, event_type: &str, data: Value) -> usize {
        let Some(registry) = self.registry() else {
            return 0;
        };
        let sent = registry
            .broadcast(Outgoing::Custom {
                event_type: event_type.to_string(),
                data,
            })
            .await;
        debug!("Broadcast '{}' to {} connections", event_type, sent);
        sent
    }

    /// Users with at least one open connection; empty when unconfigured.
    pub async fn connected_user_ids(&self) -> Vec<UserId> {
        match self.registry.get() {
            Some(registry) => registry.connected_user_ids().await,
            None => Vec::new(),
        }
    }
}
