use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{debug, info};

use mercado_db::OpenConversation;
use mercado_types::api::{CreateConversationRequest, CreateConversationResponse, Principal, StatusMessage, UpdateConversationRequest};

use crate::auth::AppState;
use crate::blocking;
use crate::messages::participant_conversation;

/// Conversations where the caller is buyer or seller, newest first.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, StatusCode> {
    let user_id = principal.id;
    let conversations = blocking(&state, move |db| db.list_conversations(user_id)).await?;
    Ok(Json(conversations))
}

/// Open (or reuse) the caller's conversation about a product. A new
/// conversation starts with the seller's rating prompt.
pub async fn create_conversation(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let buyer_id = principal.id;
    let product_id = req.product_id;
    let opened = blocking(&state, move |db| db.open_conversation(product_id, buyer_id)).await?;

    let (conversation, is_new) = match opened {
        OpenConversation::ProductNotFound => return Err(StatusCode::NOT_FOUND),
        OpenConversation::OwnProduct => return Err(StatusCode::BAD_REQUEST),
        OpenConversation::Existing(conversation) => (conversation, false),
        OpenConversation::Created(conversation) => {
            info!(
                "Conversation {} opened by {} on product {}",
                conversation.id, buyer_id, product_id
            );
            (conversation, true)
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(CreateConversationResponse {
            conversation,
            is_new_conversation: is_new,
            show_rating_prompt: is_new,
        }),
    ))
}

/// `{markRead: true}` marks every message the other participant sent as read.
pub async fn update_conversation(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(conversation_id): Path<i64>,
    Json(req): Json<UpdateConversationRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let conversation = participant_conversation(&state, conversation_id, &principal).await?;

    if req.mark_read {
        let other = conversation.other_participant(principal.id);
        let marked = blocking(&state, move |db| db.mark_conversation_read(conversation_id, other)).await?;
        debug!("Conversation {}: {} messages marked read by {}", conversation_id, marked, principal.id);
    }

    Ok(Json(StatusMessage {
        message: "Conversation updated".to_string(),
    }))
}
