use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use mercado_types::api::Principal;
use mercado_types::events::ServerEvent;

use crate::registry::{ConnectionHandle, Outgoing};
use crate::relay::Relay;
use crate::{router, snapshot};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Serve one admitted relay connection until it closes.
///
/// The principal was verified by the Auth Gate at the HTTP upgrade, so the
/// connection is registered straight away. `init:data` is written to the
/// socket before the writer task starts; anything queued for this connection
/// in the meantime is flushed right after it.
pub async fn handle_connection(socket: WebSocket, relay: Relay, principal: Principal) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} ({}) connected to relay", principal.email, principal.id);

    let (conn, mut outbound_rx) = ConnectionHandle::new(principal);
    relay.registry().register(conn.clone()).await;
    debug!("{} open relay connections", relay.registry().connection_count().await);

    match snapshot::load(&relay, conn.user_id()).await {
        Ok(snapshot) => {
            let init = Outgoing::Event(ServerEvent::InitData(snapshot));
            if send_outgoing(&mut sender, &init).await.is_err() {
                relay.registry().unregister(&conn).await;
                return;
            }
        }
        // Steady-state exchange still works without a snapshot
        Err(e) => error!("Error loading initial data for user {}: {:#}", conn.user_id(), e),
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Drain this connection's queue -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                item = outbound_rx.recv() => {
                    let Some(item) = item else { break };
                    if send_outgoing(&mut sender, &item).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Frames from one connection are handled strictly one after another
    let recv_relay = relay.clone();
    let recv_conn = conn.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => router::route(&recv_relay, &recv_conn, &text).await,
                Message::Pong(_) => pong_flag_recv.store(true, Ordering::Release),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    relay.registry().unregister(&conn).await;
    info!(
        "{} ({}) disconnected from relay",
        conn.principal().email,
        conn.user_id()
    );
}

async fn send_outgoing(
    sender: &mut SplitSink<WebSocket, Message>,
    item: &Outgoing,
) -> Result<(), axum::Error> {
    let text = match item.to_json() {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to encode outbound frame: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}
