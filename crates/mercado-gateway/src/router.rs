use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};

use mercado_types::events::{ClientFrame, ServerEvent};

use crate::handlers::{self, HandlerError};
use crate::registry::ConnectionHandle;
use crate::relay::Relay;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(serde_json::Error),
    #[error("frame has no type")]
    MissingType,
    #[error("unknown frame type '{0}'")]
    UnknownType(String),
    #[error("invalid payload for {kind}: {source}")]
    InvalidPayload {
        kind: String,
        source: serde_json::Error,
    },
}

/// Parse one inbound text frame, telling apart garbage, unknown types, and
/// known types with a bad payload.
pub fn parse_frame(text: &str) -> Result<ClientFrame, FrameError> {
    let value: Value = serde_json::from_str(text).map_err(FrameError::Malformed)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingType)?
        .to_string();

    if !ClientFrame::KINDS.contains(&kind.as_str()) {
        return Err(FrameError::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|source| FrameError::InvalidPayload { kind, source })
}

/// Handle one inbound frame from `origin`. Never fails: problems are logged,
/// and only those the client can act on produce an `error` frame.
pub async fn route(relay: &Relay, origin: &ConnectionHandle, text: &str) {
    match parse_frame(text) {
        Ok(frame) => dispatch(relay, origin, frame).await,
        Err(FrameError::InvalidPayload { kind, source }) => {
            warn!(
                "{} ({}) invalid {} payload: {}",
                origin.principal().email,
                origin.user_id(),
                kind,
                source
            );
            origin.push(ServerEvent::error(format!("invalid payload for {}", kind)));
        }
        Err(e) => {
            warn!(
                "{} ({}) dropped frame: {} -- raw: {}",
                origin.principal().email,
                origin.user_id(),
                e,
                truncate(text, 200)
            );
        }
    }
}

/// Run the handler for one parsed frame and report its failure, if any, to
/// the originating connection.
pub async fn dispatch(relay: &Relay, origin: &ConnectionHandle, frame: ClientFrame) {
    let kind = frame.kind();
    let result = match frame {
        ClientFrame::ChatSend {
            conversation_id,
            content,
        } => handlers::chat_send(relay, origin, conversation_id, content).await,
        ClientFrame::NotificationSend {
            user_id,
            title,
            body,
            type_id,
        } => handlers::notification_send(relay, origin, user_id, title, body, type_id).await,
        ClientFrame::ChatRead { message_id } => {
            handlers::chat_read(relay, origin, message_id).await
        }
        ClientFrame::NotificationRead { notification_id } => {
            handlers::notification_read(relay, origin, notification_id).await
        }
    };

    let Err(e) = result else {
        return;
    };
    match &e {
        HandlerError::Storage(_) => {
            error!("{} from user {} aborted: {}", kind, origin.user_id(), e)
        }
        HandlerError::Validation(_) | HandlerError::Forbidden(_) => {
            warn!("{} from user {} rejected: {}", kind, origin.user_id(), e)
        }
    }
    origin.push(ServerEvent::error(e.client_message()));
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
