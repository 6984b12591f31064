use anyhow::Result;
use tracing::debug;

use mercado_types::models::{Snapshot, UserId};

use crate::relay::Relay;

/// Build the `init:data` payload for a newly admitted user: unread
/// notifications newest first, and one summary per conversation the user
/// takes part in.
pub async fn load(relay: &Relay, user_id: UserId) -> Result<Snapshot> {
    let snapshot = relay.storage(move |db| db.load_snapshot(user_id)).await?;
    debug!(
        "snapshot for {}: {} notifications, {} conversations",
        user_id,
        snapshot.notifications.len(),
        snapshot.conversations.len()
    );
    Ok(snapshot)
}
