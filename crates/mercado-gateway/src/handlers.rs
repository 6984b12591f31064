use thiserror::Error;
use tracing::{debug, info};

use mercado_db::MessageNotice;
use mercado_types::events::{ReadBy, ServerEvent};
use mercado_types::models::{NewNotification, UserId};

use crate::registry::ConnectionHandle;
use crate::relay::Relay;

/// Title of the notification that accompanies every chat message.
pub const CHAT_NOTIFICATION_TITLE: &str = "Nuevo mensaje recibido";
/// Notification type name, resolved to an id at write time.
pub const CHAT_NOTIFICATION_TYPE: &str = "Mensaje";
/// Characters of message content copied into the companion notification.
pub const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl HandlerError {
    /// Text sent back in the `error` frame. Storage details stay server-side.
    pub fn client_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::Forbidden(msg) => msg.clone(),
            Self::Storage(_) => "internal error".to_string(),
        }
    }
}

fn validation(msg: &str) -> HandlerError {
    HandlerError::Validation(msg.to_string())
}

fn forbidden(msg: &str) -> HandlerError {
    HandlerError::Forbidden(msg.to_string())
}

/// First `PREVIEW_CHARS` characters of `content`, on char boundaries.
pub fn preview(content: &str) -> String {
    content.chars().take(PREVIEW_CHARS).collect()
}

/// `chat:send`: persist the message and its companion notification in one
/// transaction, fan `chat:new` out to the other participant, then confirm
/// with `chat:sent` to the sending connection.
pub async fn chat_send(
    relay: &Relay,
    origin: &ConnectionHandle,
    conversation_id: i64,
    content: String,
) -> Result<(), HandlerError> {
    if content.trim().is_empty() {
        return Err(validation("content required"));
    }
    let sender_id = origin.user_id();

    let conversation = relay
        .storage(move |db| db.get_conversation(conversation_id))
        .await?
        .ok_or_else(|| validation("conversation not found"))?;

    if !conversation.is_participant(sender_id) {
        return Err(forbidden("not a participant of this conversation"));
    }
    let recipient_id = conversation.other_participant(sender_id);

    let notice = MessageNotice {
        recipient_id,
        type_name: CHAT_NOTIFICATION_TYPE.to_string(),
        title: CHAT_NOTIFICATION_TITLE.to_string(),
        body: preview(&content),
        product_id: Some(conversation.product_id),
    };
    let (message, notification) = relay
        .storage(move |db| {
            db.insert_message_with_notice(conversation_id, sender_id, &content, &notice)
        })
        .await?;

    // Committed; only now touch the registry
    let delivered = relay
        .registry()
        .send_to_user(
            recipient_id,
            ServerEvent::ChatNew {
                message: message.clone(),
                notification,
            },
        )
        .await;
    debug!(
        "message {} in conversation {}: {} -> {} ({} connections)",
        message.id, conversation_id, sender_id, recipient_id, delivered
    );

    origin.push(ServerEvent::ChatSent { message });
    Ok(())
}

/// `notification:send`: persist a notification for `user_id` and push it to
/// that user's live connections. The sender gets no acknowledgment.
pub async fn notification_send(
    relay: &Relay,
    origin: &ConnectionHandle,
    user_id: UserId,
    title: String,
    body: String,
    type_id: i64,
) -> Result<(), HandlerError> {
    if title.trim().is_empty() {
        return Err(validation("title required"));
    }

    let (user_known, type_known) = relay
        .storage(move |db| Ok((db.user_exists(user_id)?, db.notification_type_exists(type_id)?)))
        .await?;
    if !user_known {
        return Err(validation("user not found"));
    }
    if !type_known {
        return Err(validation("unknown notification type"));
    }

    let new = NewNotification {
        user_id,
        type_id,
        title,
        message: body,
        product_id: None,
        report_id: None,
    };
    let notification = relay.storage(move |db| db.insert_notification(&new)).await?;

    let delivered = relay
        .registry()
        .send_to_user(user_id, ServerEvent::NotificationNew(notification.clone()))
        .await;
    info!(
        "{} ({}) notified user {}: notification {} ({} connections)",
        origin.principal().email,
        origin.user_id(),
        user_id,
        notification.id,
        delivered
    );
    Ok(())
}

/// `chat:read`: mark the message read and tell both participants. The
/// sender's connections get `readBy: "receiver"`, the receiver's get
/// `readBy: "self"`. The receiver is always derived from the conversation.
pub async fn chat_read(
    relay: &Relay,
    origin: &ConnectionHandle,
    message_id: i64,
) -> Result<(), HandlerError> {
    let found = relay
        .storage(move |db| {
            let Some(message) = db.get_message(message_id)? else {
                return Ok(None);
            };
            let conversation = db.get_conversation(message.conversation_id)?;
            Ok(Some((message, conversation)))
        })
        .await?;

    let Some((message, conversation)) = found else {
        debug!("chat:read for unknown message {}", message_id);
        return Ok(());
    };
    let conversation = conversation.ok_or_else(|| validation("conversation not found"))?;
    if !conversation.is_participant(origin.user_id()) {
        return Err(forbidden("not a participant of this conversation"));
    }

    relay.storage(move |db| db.mark_message_read(message_id)).await?;

    let receiver_id = conversation.other_participant(message.sender_id);
    let update = |read_by| ServerEvent::ChatReadUpdate {
        message_id: message.id,
        conversation_id: message.conversation_id,
        read_by,
        read: true,
    };
    let registry = relay.registry();
    registry
        .send_to_user(message.sender_id, update(ReadBy::Receiver))
        .await;
    registry.send_to_user(receiver_id, update(ReadBy::Myself)).await;

    debug!("message {} marked as read by {}", message_id, origin.user_id());
    Ok(())
}

/// `notification:read`: mark the caller's notification read and confirm to
/// the requesting connection only.
pub async fn notification_read(
    relay: &Relay,
    origin: &ConnectionHandle,
    notification_id: i64,
) -> Result<(), HandlerError> {
    let Some(notification) = relay
        .storage(move |db| db.get_notification(notification_id))
        .await?
    else {
        debug!("notification:read for unknown notification {}", notification_id);
        return Ok(());
    };
    if notification.user_id != origin.user_id() {
        return Err(forbidden("notification belongs to another user"));
    }

    relay
        .storage(move |db| db.set_notification_read(notification_id, true))
        .await?;

    origin.push(ServerEvent::NotificationReadConfirm { notification_id });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{connect, drain, market};

    #[tokio::test]
    async fn buyer_message_reaches_seller_and_confirms_to_buyer() {
        let m = market();
        let (buyer_conn, mut buyer_rx) = connect(&m.relay, m.buyer).await;
        let (_seller_conn, mut seller_rx) = connect(&m.relay, m.seller).await;

        chat_send(&m.relay, &buyer_conn, m.conversation.id, "Hola".into())
            .await
            .unwrap();

        match drain(&mut buyer_rx).as_slice() {
            [ServerEvent::ChatSent { message }] => assert_eq!(message.sender_id, m.buyer),
            other => panic!("buyer got {:?}", other),
        }
        match drain(&mut seller_rx).as_slice() {
            [ServerEvent::ChatNew { message, notification }] => {
                assert_eq!(message.content, "Hola");
                assert!(!message.read);
                assert_eq!(notification.user_id, m.seller);
                assert_eq!(notification.title, CHAT_NOTIFICATION_TITLE);
                assert_eq!(notification.message, "Hola");
            }
            other => panic!("seller got {:?}", other),
        }
    }

    #[tokio::test]
    async fn seller_message_targets_buyer() {
        let m = market();
        let (seller_conn, mut seller_rx) = connect(&m.relay, m.seller).await;
        let (_buyer_conn, mut buyer_rx) = connect(&m.relay, m.buyer).await;

        chat_send(&m.relay, &seller_conn, m.conversation.id, "Sigue disponible".into())
            .await
            .unwrap();

        assert!(matches!(drain(&mut buyer_rx).as_slice(), [ServerEvent::ChatNew { .. }]));
        assert!(matches!(drain(&mut seller_rx).as_slice(), [ServerEvent::ChatSent { .. }]));
    }

    #[tokio::test]
    async fn offline_recipient_still_gets_durable_notification() {
        let m = market();
        let (buyer_conn, mut buyer_rx) = connect(&m.relay, m.buyer).await;

        chat_send(&m.relay, &buyer_conn, m.conversation.id, "Hola".into())
            .await
            .unwrap();

        assert_eq!(drain(&mut buyer_rx).len(), 1);
        let seller = m.seller;
        let pending = m
            .relay
            .storage(move |db| db.unread_notifications(seller))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn notification_preview_is_truncated_to_80_chars() {
        let m = market();
        let (buyer_conn, _buyer_rx) = connect(&m.relay, m.buyer).await;
        let (_seller_conn, mut seller_rx) = connect(&m.relay, m.seller).await;
        let long = "ñ".repeat(120);

        chat_send(&m.relay, &buyer_conn, m.conversation.id, long.clone())
            .await
            .unwrap();

        match drain(&mut seller_rx).as_slice() {
            [ServerEvent::ChatNew { message, notification }] => {
                assert_eq!(message.content, long);
                assert_eq!(notification.message.chars().count(), PREVIEW_CHARS);
            }
            other => panic!("seller got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_conversation_is_a_validation_error() {
        let m = market();
        let (buyer_conn, mut buyer_rx) = connect(&m.relay, m.buyer).await;

        let err = chat_send(&m.relay, &buyer_conn, 999, "Hola".into())
            .await
            .unwrap_err();
        assert_eq!(err.client_message(), "conversation not found");
        assert!(drain(&mut buyer_rx).is_empty());
    }

    #[tokio::test]
    async fn outsider_cannot_post_into_a_conversation() {
        let m = market();
        let (outsider, _rx) = connect(&m.relay, 77).await;

        let err = chat_send(&m.relay, &outsider, m.conversation.id, "spam".into())
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Forbidden(_)));

        let conv_id = m.conversation.id;
        let messages = m
            .relay
            .storage(move |db| db.list_messages(conv_id))
            .await
            .unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn direct_notification_is_pushed_to_target_only() {
        let m = market();
        let (buyer_conn, mut buyer_rx) = connect(&m.relay, m.buyer).await;
        let (_seller_conn, mut seller_rx) = connect(&m.relay, m.seller).await;

        notification_send(&m.relay, &buyer_conn, m.seller, "Oferta".into(), "20 soles".into(), 2)
            .await
            .unwrap();

        assert!(drain(&mut buyer_rx).is_empty());
        match drain(&mut seller_rx).as_slice() {
            [ServerEvent::NotificationNew(n)] => {
                assert_eq!(n.title, "Oferta");
                assert_eq!(n.message, "20 soles");
                assert_eq!(n.type_id, 2);
            }
            other => panic!("seller got {:?}", other),
        }
    }

    #[tokio::test]
    async fn notification_for_unknown_user_or_type_is_a_validation_error() {
        let m = market();
        let (buyer_conn, _buyer_rx) = connect(&m.relay, m.buyer).await;

        let err = notification_send(&m.relay, &buyer_conn, 9999, "t".into(), "b".into(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Validation(_)));
        assert_eq!(err.client_message(), "user not found");

        let err = notification_send(&m.relay, &buyer_conn, m.seller, "t".into(), "b".into(), 42)
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Validation(_)));
        assert_eq!(err.client_message(), "unknown notification type");

        let seller = m.seller;
        let stored = m
            .relay
            .storage(move |db| db.list_notifications(seller))
            .await
            .unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn storage_failure_fans_nothing_out() {
        let m = market();
        let (buyer_conn, mut buyer_rx) = connect(&m.relay, m.buyer).await;
        let (_seller_conn, mut seller_rx) = connect(&m.relay, m.seller).await;
        m.relay
            .storage(|db| {
                db.with_conn(|conn| {
                    conn.execute("DELETE FROM notification_types WHERE type_name = 'Mensaje'", [])?;
                    Ok(())
                })
            })
            .await
            .unwrap();

        let frame = serde_json::json!({
            "type": "chat:send",
            "conversationId": m.conversation.id,
            "content": "Hola",
        });
        crate::router::route(&m.relay, &buyer_conn, &frame.to_string()).await;

        assert_eq!(drain(&mut buyer_rx), vec![ServerEvent::error("internal error")]);
        assert!(drain(&mut seller_rx).is_empty());
        let conv_id = m.conversation.id;
        let messages = m
            .relay
            .storage(move |db| db.list_messages(conv_id))
            .await
            .unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn read_update_reaches_both_sides_with_their_perspective() {
        let m = market();
        let (buyer_conn, mut buyer_rx) = connect(&m.relay, m.buyer).await;
        let (seller_conn, mut seller_rx) = connect(&m.relay, m.seller).await;
        chat_send(&m.relay, &buyer_conn, m.conversation.id, "Hola".into())
            .await
            .unwrap();
        drain(&mut buyer_rx);
        let message_id = match drain(&mut seller_rx).pop() {
            Some(ServerEvent::ChatNew { message, .. }) => message.id,
            other => panic!("seller got {:?}", other),
        };

        chat_read(&m.relay, &seller_conn, message_id).await.unwrap();

        let expect = |read_by| ServerEvent::ChatReadUpdate {
            message_id,
            conversation_id: m.conversation.id,
            read_by,
            read: true,
        };
        assert_eq!(drain(&mut buyer_rx), vec![expect(ReadBy::Receiver)]);
        assert_eq!(drain(&mut seller_rx), vec![expect(ReadBy::Myself)]);
    }

    #[tokio::test]
    async fn chat_read_is_idempotent_and_ignores_missing_messages() {
        let m = market();
        let (seller_conn, _rx) = connect(&m.relay, m.seller).await;
        let (conv_id, buyer) = (m.conversation.id, m.buyer);
        let message = m
            .relay
            .storage(move |db| db.insert_message(conv_id, buyer, "Hola"))
            .await
            .unwrap();

        chat_read(&m.relay, &seller_conn, message.id).await.unwrap();
        chat_read(&m.relay, &seller_conn, message.id).await.unwrap();
        chat_read(&m.relay, &seller_conn, 4242).await.unwrap();

        let stored = m
            .relay
            .storage(move |db| db.get_message(message.id))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.read);
    }

    #[tokio::test]
    async fn notification_read_confirms_to_owner() {
        let m = market();
        let seller = m.seller;
        let notification = m
            .relay
            .storage(move |db| {
                db.insert_notification(&NewNotification {
                    user_id: seller,
                    type_id: 2,
                    title: "Alerta".into(),
                    message: "Producto reportado".into(),
                    product_id: None,
                    report_id: None,
                })
            })
            .await
            .unwrap();
        let (seller_conn, mut seller_rx) = connect(&m.relay, m.seller).await;

        notification_read(&m.relay, &seller_conn, notification.id)
            .await
            .unwrap();

        assert_eq!(
            drain(&mut seller_rx),
            vec![ServerEvent::NotificationReadConfirm { notification_id: notification.id }]
        );
        let id = notification.id;
        let stored = m
            .relay
            .storage(move |db| db.get_notification(id))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.read);

        let (buyer_conn, _buyer_rx) = connect(&m.relay, m.buyer).await;
        let err = notification_read(&m.relay, &buyer_conn, notification.id)
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Forbidden(_)));
    }

    #[test]
    fn storage_errors_are_not_leaked_to_clients() {
        let err = HandlerError::Storage(anyhow::anyhow!("disk I/O error"));
        assert_eq!(err.client_message(), "internal error");
    }
}
