use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, warn};

use mercado_db::MessageNotice;
use mercado_types::api::{CreateMessageRequest, MessageQuery, Principal};
use mercado_types::models::Conversation;

use crate::auth::AppState;
use crate::blocking;

pub const MESSAGE_NOTIFICATION_TITLE: &str = "Nuevo mensaje";
const MESSAGE_NOTIFICATION_TYPE: &str = "Mensaje";

/// Load a conversation and make sure the caller takes part in it.
pub(crate) async fn participant_conversation(
    state: &AppState,
    conversation_id: i64,
    principal: &Principal,
) -> Result<Conversation, StatusCode> {
    let conversation = blocking(state, move |db| db.get_conversation(conversation_id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    if !conversation.is_participant(principal.id) {
        warn!(
            "{} ({}) is not a participant of conversation {}",
            principal.email, principal.id, conversation_id
        );
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(conversation)
}

/// Persist a message sent over HTTP and notify the other participant
/// through the relay.
pub async fn create_message(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.content.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let conversation = participant_conversation(&state, req.conversation_id, &principal).await?;
    let recipient_id = conversation.other_participant(principal.id);

    let notice = MessageNotice {
        recipient_id,
        type_name: MESSAGE_NOTIFICATION_TYPE.to_string(),
        title: MESSAGE_NOTIFICATION_TITLE.to_string(),
        body: format!("Nuevo mensaje en el producto {}", conversation.product_id),
        product_id: Some(conversation.product_id),
    };
    let sender_id = principal.id;
    let content = req.content;
    let (message, notification) = blocking(&state, move |db| {
        db.insert_message_with_notice(conversation.id, sender_id, &content, &notice)
    })
    .await?;

    let delivery = state.bridge.notify_users([recipient_id], &notification).await;
    debug!(
        "Message {} stored, notification {} reached {} connections",
        message.id, notification.id, delivery.connections
    );

    Ok((StatusCode::CREATED, Json(message)))
}

/// Messages of one conversation, oldest first. Participants only.
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let conversation = participant_conversation(&state, query.conversation_id, &principal).await?;
    let messages = blocking(&state, move |db| db.list_messages(conversation.id)).await?;
    Ok(Json(messages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercado_types::events::ServerEvent;
    use mercado_types::models::Message;

    use crate::testing::{body_json, connect, drain, market, principal};

    fn send(conversation_id: i64, content: &str) -> Json<CreateMessageRequest> {
        Json(CreateMessageRequest {
            conversation_id,
            content: content.into(),
        })
    }

    #[tokio::test]
    async fn message_notifies_the_other_participant() {
        let m = market();
        let mut seller_rx = connect(&m.registry, m.seller).await;
        let mut buyer_rx = connect(&m.registry, m.buyer).await;

        let res = create_message(
            State(m.state.clone()),
            Extension(principal(m.buyer)),
            send(m.conversation.id, "¿Sigue disponible?"),
        )
        .await
        .unwrap()
        .into_response();
        assert_eq!(res.status(), StatusCode::CREATED);
        let message: Message = body_json(res).await;
        assert_eq!(message.sender_id, m.buyer);

        let events = drain(&mut seller_rx);
        assert_eq!(events.len(), 1);
        let ServerEvent::NewNotification(n) = &events[0] else {
            panic!("unexpected {:?}", events);
        };
        assert_eq!(n.user_id, m.seller);
        assert_eq!(n.title, MESSAGE_NOTIFICATION_TITLE);
        assert_eq!(
            n.message,
            format!("Nuevo mensaje en el producto {}", m.conversation.product_id)
        );
        assert!(drain(&mut buyer_rx).is_empty());
    }

    #[tokio::test]
    async fn outsiders_and_missing_conversations_are_refused() {
        let m = market();

        let err = create_message(
            State(m.state.clone()),
            Extension(principal(m.outsider)),
            send(m.conversation.id, "Hola"),
        )
        .await
        .err();
        assert_eq!(err, Some(StatusCode::FORBIDDEN));

        let err = create_message(State(m.state.clone()), Extension(principal(m.buyer)), send(999, "Hola"))
            .await
            .err();
        assert_eq!(err, Some(StatusCode::NOT_FOUND));

        let err = create_message(
            State(m.state.clone()),
            Extension(principal(m.buyer)),
            send(m.conversation.id, "   "),
        )
        .await
        .err();
        assert_eq!(err, Some(StatusCode::BAD_REQUEST));

        let conv_id = m.conversation.id;
        let stored = m.state.db.list_messages(conv_id).unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn listing_returns_messages_in_order() {
        let m = market();
        for (sender, content) in [(m.buyer, "uno"), (m.seller, "dos")] {
            create_message(State(m.state.clone()), Extension(principal(sender)), send(m.conversation.id, content))
                .await
                .unwrap();
        }

        let res = list_messages(
            State(m.state.clone()),
            Extension(principal(m.seller)),
            Query(MessageQuery {
                conversation_id: m.conversation.id,
            }),
        )
        .await
        .unwrap()
        .into_response();
        let messages: Vec<Message> = body_json(res).await;
        let contents: Vec<_> = messages.iter().map(|msg| msg.content.as_str()).collect();
        assert_eq!(contents, vec!["uno", "dos"]);
    }
}
