use serde::{Deserialize, Serialize};

use crate::models::{Message, Notification, Snapshot, UserId};

/// Events sent FROM server TO client over the relay.
///
/// Serialized as `{"type": "...", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    /// Initial state, sent once right after admission
    #[serde(rename = "init:data")]
    InitData(Snapshot),

    /// A peer sent a message to this user
    #[serde(rename = "chat:new")]
    ChatNew {
        message: Message,
        notification: Notification,
    },

    /// The sender's own message was persisted
    #[serde(rename = "chat:sent")]
    ChatSent { message: Message },

    /// A notification addressed directly to this user
    #[serde(rename = "notification:new")]
    NotificationNew(Notification),

    /// A message in one of this user's conversations was read
    #[serde(rename = "chat:read:update", rename_all = "camelCase")]
    ChatReadUpdate {
        message_id: i64,
        conversation_id: i64,
        read_by: ReadBy,
        read: bool,
    },

    #[serde(rename = "notification:read:confirm", rename_all = "camelCase")]
    NotificationReadConfirm { notification_id: i64 },

    /// Notification pushed from the HTTP side
    #[serde(rename = "newNotification")]
    NewNotification(Notification),

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    /// Wire name of the event, as found in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InitData(_) => "init:data",
            Self::ChatNew { .. } => "chat:new",
            Self::ChatSent { .. } => "chat:sent",
            Self::NotificationNew(_) => "notification:new",
            Self::ChatReadUpdate { .. } => "chat:read:update",
            Self::NotificationReadConfirm { .. } => "notification:read:confirm",
            Self::NewNotification(_) => "newNotification",
            Self::Error { .. } => "error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }
}

/// Who read the message, relative to the connection receiving the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadBy {
    /// The other participant read a message this user sent
    #[serde(rename = "receiver")]
    Receiver,
    /// This user read a message addressed to them
    #[serde(rename = "self")]
    Myself,
}

/// Frames sent FROM client TO server over the relay.
///
/// Flat objects discriminated by `type`, e.g.
/// `{"type": "chat:send", "conversationId": 100, "content": "Hola"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    #[serde(rename = "chat:send", rename_all = "camelCase")]
    ChatSend { conversation_id: i64, content: String },

    /// `type` is taken by the discriminant, so the notification type id
    /// travels as `typeId`.
    #[serde(rename = "notification:send", rename_all = "camelCase")]
    NotificationSend {
        user_id: UserId,
        title: String,
        body: String,
        type_id: i64,
    },

    #[serde(rename = "chat:read", rename_all = "camelCase")]
    ChatRead { message_id: i64 },

    #[serde(rename = "notification:read", rename_all = "camelCase")]
    NotificationRead { notification_id: i64 },
}

impl ClientFrame {
    /// Every discriminant the relay understands.
    pub const KINDS: [&'static str; 4] =
        ["chat:send", "notification:send", "chat:read", "notification:read"];

    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChatSend { .. } => "chat:send",
            Self::NotificationSend { .. } => "notification:send",
            Self::ChatRead { .. } => "chat:read",
            Self::NotificationRead { .. } => "notification:read",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chat_send_parses_flat_frame() {
        let frame: ClientFrame = serde_json::from_value(json!({
            "type": "chat:send",
            "conversationId": 100,
            "content": "Hola"
        }))
        .unwrap();
        assert_eq!(
            frame,
            ClientFrame::ChatSend { conversation_id: 100, content: "Hola".into() }
        );
    }

    #[test]
    fn read_update_uses_wire_names() {
        let event = ServerEvent::ChatReadUpdate {
            message_id: 3,
            conversation_id: 100,
            read_by: ReadBy::Myself,
            read: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "chat:read:update");
        assert_eq!(json["data"]["messageId"], 3);
        assert_eq!(json["data"]["readBy"], "self");
        assert_eq!(event.kind(), "chat:read:update");
    }

    #[test]
    fn error_event_carries_message() {
        let json = serde_json::to_value(ServerEvent::error("conversation not found")).unwrap();
        assert_eq!(json, json!({"type": "error", "data": {"message": "conversation not found"}}));
    }
}
