use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marketplace user ids are database-assigned integers.
pub type UserId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: i64,
    pub product_id: i64,
    pub buyer_id: UserId,
    pub seller_id: UserId,
}

impl Conversation {
    pub fn is_participant(&self, user_id: UserId) -> bool {
        self.buyer_id == user_id || self.seller_id == user_id
    }

    /// The participant on the other side of `user_id`.
    ///
    /// Anyone who is not the buyer is treated as the seller side, so the
    /// buyer is returned for them.
    pub fn other_participant(&self, user_id: UserId) -> UserId {
        if self.buyer_id == user_id {
            self.seller_id
        } else {
            self.buyer_id
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub sender_id: UserId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub read: bool,
    pub is_rating_message: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: UserId,
    pub type_id: i64,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub product_id: Option<i64>,
    pub report_id: Option<i64>,
}

/// Fields needed to create a notification row.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: UserId,
    pub type_id: i64,
    pub title: String,
    pub message: String,
    pub product_id: Option<i64>,
    pub report_id: Option<i64>,
}

// -- Snapshot --

/// Initial state pushed to a connection right after admission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub notifications: Vec<Notification>,
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: i64,
    pub product: ProductPreview,
    pub last_message: Option<LastMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPreview {
    pub id: i64,
    pub title: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub content: String,
    /// Sender display name, "first last".
    pub sender: String,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_participant_flips_buyer_and_seller() {
        let conv = Conversation { id: 100, product_id: 5, buyer_id: 1, seller_id: 2 };
        assert_eq!(conv.other_participant(1), 2);
        assert_eq!(conv.other_participant(2), 1);
        assert!(conv.is_participant(1));
        assert!(!conv.is_participant(3));
    }

    #[test]
    fn summary_serializes_camel_case_with_null_last_message() {
        let summary = ConversationSummary {
            conversation_id: 100,
            product: ProductPreview { id: 5, title: "Bici".into(), image_url: None },
            last_message: None,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["conversationId"], 100);
        assert!(json["product"]["imageUrl"].is_null());
        assert!(json["lastMessage"].is_null());
    }
}
