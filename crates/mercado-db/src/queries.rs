use crate::Database;
use crate::models::{UserRow, now_timestamp, timestamp_column};
use anyhow::{Result, anyhow};
use mercado_types::models::{
    Conversation, ConversationSummary, LastMessage, Message, NewNotification, Notification,
    ProductPreview, Snapshot, UserId,
};
use rusqlite::{Connection, Row};

/// Companion notification written in the same transaction as a message.
#[derive(Debug, Clone)]
pub struct MessageNotice {
    pub recipient_id: UserId,
    /// Resolved to a type id by name inside the transaction.
    pub type_name: String,
    pub title: String,
    pub body: String,
    pub product_id: Option<i64>,
}

/// Content of the automatic message that asks the buyer to rate the seller.
pub const RATING_PROMPT: &str = "rating_prompt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenConversation {
    ProductNotFound,
    OwnProduct,
    Existing(Conversation),
    Created(Conversation),
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        email: &str,
        name: &str,
        lastname: &str,
        password_hash: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (email, name, lastname, password_hash) VALUES (?1, ?2, ?3, ?4)",
                (email, name, lastname, password_hash),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, email, name, lastname, password_hash FROM users WHERE email = ?1",
                [email],
                map_user,
            )
            .optional()
        })
    }

    pub fn user_exists(&self, user_id: UserId) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM users WHERE id = ?1", [user_id], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn assign_role(&self, user_id: UserId, role_name: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO user_roles (user_id, role_id)
                 SELECT ?1, id FROM roles WHERE role_name = ?2",
                rusqlite::params![user_id, role_name],
            )?;
            if changed == 0 {
                tracing::debug!("role '{}' not assigned to user {}", role_name, user_id);
            }
            Ok(())
        })
    }

    pub fn get_user_roles(&self, user_id: UserId) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.role_name FROM user_roles ur
                 JOIN roles r ON r.id = ur.role_id
                 WHERE ur.user_id = ?1
                 ORDER BY r.id",
            )?;
            let roles = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(roles)
        })
    }

    // -- Products --

    pub fn create_product(&self, seller_id: UserId, title: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO products (seller_id, title) VALUES (?1, ?2)",
                rusqlite::params![seller_id, title],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn add_product_photo(&self, product_id: i64, url: &str, position: i64) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO product_photos (product_id, photo_url, position) VALUES (?1, ?2, ?3)",
                rusqlite::params![product_id, url, position],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    // -- Conversations --

    pub fn create_conversation(
        &self,
        product_id: i64,
        buyer_id: UserId,
        seller_id: UserId,
    ) -> Result<Conversation> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO conversations (product_id, buyer_id, seller_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![product_id, buyer_id, seller_id],
            )?;
            Ok(Conversation {
                id: conn.last_insert_rowid(),
                product_id,
                buyer_id,
                seller_id,
            })
        })
    }

    /// Find the buyer's conversation about a product, or create it together
    /// with the seller's rating prompt message in one transaction.
    pub fn open_conversation(&self, product_id: i64, buyer_id: UserId) -> Result<OpenConversation> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let seller_id: Option<UserId> = tx
                .query_row("SELECT seller_id FROM products WHERE id = ?1", [product_id], |row| {
                    row.get(0)
                })
                .optional()?;
            let Some(seller_id) = seller_id else {
                return Ok(OpenConversation::ProductNotFound);
            };
            if seller_id == buyer_id {
                return Ok(OpenConversation::OwnProduct);
            }

            let existing = tx
                .query_row(
                    "SELECT id, product_id, buyer_id, seller_id FROM conversations
                     WHERE product_id = ?1 AND buyer_id = ?2 AND seller_id = ?3",
                    rusqlite::params![product_id, buyer_id, seller_id],
                    map_conversation,
                )
                .optional()?;
            if let Some(conversation) = existing {
                return Ok(OpenConversation::Existing(conversation));
            }

            tx.execute(
                "INSERT INTO conversations (product_id, buyer_id, seller_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![product_id, buyer_id, seller_id],
            )?;
            let conversation = Conversation {
                id: tx.last_insert_rowid(),
                product_id,
                buyer_id,
                seller_id,
            };
            insert_message_row(&tx, conversation.id, seller_id, RATING_PROMPT, true)?;

            tx.commit()?;
            Ok(OpenConversation::Created(conversation))
        })
    }

    pub fn get_conversation(&self, id: i64) -> Result<Option<Conversation>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    /// Conversations where the user is buyer or seller, newest first.
    pub fn list_conversations(&self, user_id: UserId) -> Result<Vec<Conversation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, product_id, buyer_id, seller_id FROM conversations
                 WHERE buyer_id = ?1 OR seller_id = ?1
                 ORDER BY id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_conversation)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Conversation summaries for the relay snapshot: product preview with
    /// its first photo, plus the single most recent message.
    pub fn conversation_summaries(&self, user_id: UserId) -> Result<Vec<ConversationSummary>> {
        self.with_conn(|conn| query_conversation_summaries(conn, user_id))
    }

    /// Unread notifications and conversation summaries read under a single
    /// lock acquisition, so no write lands between the two reads.
    pub fn load_snapshot(&self, user_id: UserId) -> Result<Snapshot> {
        self.with_conn(|conn| {
            Ok(Snapshot {
                notifications: query_notifications(conn, user_id, true)?,
                conversations: query_conversation_summaries(conn, user_id)?,
            })
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        conversation_id: i64,
        sender_id: UserId,
        content: &str,
    ) -> Result<Message> {
        self.with_conn(|conn| insert_message_row(conn, conversation_id, sender_id, content, false))
    }

    /// Persist a message and its companion notification atomically.
    /// Either both rows exist afterwards or neither does.
    pub fn insert_message_with_notice(
        &self,
        conversation_id: i64,
        sender_id: UserId,
        content: &str,
        notice: &MessageNotice,
    ) -> Result<(Message, Notification)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let type_id = query_notification_type_id(&tx, &notice.type_name)?
                .ok_or_else(|| anyhow!("Notification type not found: {}", notice.type_name))?;

            let message = insert_message_row(&tx, conversation_id, sender_id, content, false)?;
            let notification = insert_notification_row(
                &tx,
                &NewNotification {
                    user_id: notice.recipient_id,
                    type_id,
                    title: notice.title.clone(),
                    message: notice.body.clone(),
                    product_id: notice.product_id,
                    report_id: None,
                },
            )?;

            tx.commit()?;
            Ok((message, notification))
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<Message>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, conversation_id, sender_id, content, sent_at, read, is_rating_message
                 FROM messages WHERE id = ?1",
                [id],
                map_message,
            )
            .optional()
        })
    }

    /// Messages of a conversation in the order they were sent.
    pub fn list_messages(&self, conversation_id: i64) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, content, sent_at, read, is_rating_message
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY sent_at, id",
            )?;
            let rows = stmt
                .query_map([conversation_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false if the message does not exist. Marking an already read
    /// message is not an error.
    pub fn mark_message_read(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("UPDATE messages SET read = 1 WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    /// Mark every message `sender_id` sent in the conversation as read.
    pub fn mark_conversation_read(&self, conversation_id: i64, sender_id: UserId) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET read = 1 WHERE conversation_id = ?1 AND sender_id = ?2 AND read = 0",
                rusqlite::params![conversation_id, sender_id],
            )?;
            Ok(changed)
        })
    }

    // -- Notifications --

    pub fn notification_type_id(&self, type_name: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| query_notification_type_id(conn, type_name))
    }

    pub fn notification_type_exists(&self, type_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM notification_types WHERE id = ?1", [type_id], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn insert_notification(&self, new: &NewNotification) -> Result<Notification> {
        self.with_conn(|conn| insert_notification_row(conn, new))
    }

    pub fn get_notification(&self, id: i64) -> Result<Option<Notification>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, type_id, title, message, read, created_at, product_id, report_id
                 FROM notifications WHERE id = ?1",
                [id],
                map_notification,
            )
            .optional()
        })
    }

    /// All notifications owned by the user, newest first.
    pub fn list_notifications(&self, user_id: UserId) -> Result<Vec<Notification>> {
        self.with_conn(|conn| query_notifications(conn, user_id, false))
    }

    /// Unread notifications owned by the user, newest first.
    pub fn unread_notifications(&self, user_id: UserId) -> Result<Vec<Notification>> {
        self.with_conn(|conn| query_notifications(conn, user_id, true))
    }

    pub fn set_notification_read(&self, id: i64, read: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read = ?2 WHERE id = ?1",
                rusqlite::params![id, read],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_notification(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM notifications WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }
}

fn insert_message_row(
    conn: &Connection,
    conversation_id: i64,
    sender_id: UserId,
    content: &str,
    is_rating_message: bool,
) -> Result<Message> {
    let (sent_at, sent_at_text) = now_timestamp();
    conn.execute(
        "INSERT INTO messages (conversation_id, sender_id, content, sent_at, read, is_rating_message)
         VALUES (?1, ?2, ?3, ?4, 0, ?5)",
        rusqlite::params![conversation_id, sender_id, content, sent_at_text, is_rating_message],
    )?;

    Ok(Message {
        id: conn.last_insert_rowid(),
        conversation_id,
        sender_id,
        content: content.to_string(),
        sent_at,
        read: false,
        is_rating_message,
    })
}

fn insert_notification_row(conn: &Connection, new: &NewNotification) -> Result<Notification> {
    let (created_at, created_at_text) = now_timestamp();
    conn.execute(
        "INSERT INTO notifications (user_id, type_id, title, message, read, created_at, product_id, report_id)
         VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?7)",
        rusqlite::params![
            new.user_id,
            new.type_id,
            new.title,
            new.message,
            created_at_text,
            new.product_id,
            new.report_id
        ],
    )?;

    Ok(Notification {
        id: conn.last_insert_rowid(),
        user_id: new.user_id,
        type_id: new.type_id,
        title: new.title.clone(),
        message: new.message.clone(),
        read: false,
        created_at,
        product_id: new.product_id,
        report_id: new.report_id,
    })
}

fn query_notification_type_id(conn: &Connection, type_name: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM notification_types WHERE type_name = ?1",
        [type_name],
        |row| row.get(0),
    )
    .optional()
}

fn query_conversation(conn: &Connection, id: i64) -> Result<Option<Conversation>> {
    conn.query_row(
        "SELECT id, product_id, buyer_id, seller_id FROM conversations WHERE id = ?1",
        [id],
        map_conversation,
    )
    .optional()
}

fn query_notifications(conn: &Connection, user_id: UserId, unread_only: bool) -> Result<Vec<Notification>> {
    let sql = if unread_only {
        "SELECT id, user_id, type_id, title, message, read, created_at, product_id, report_id
         FROM notifications WHERE user_id = ?1 AND read = 0
         ORDER BY created_at DESC, id DESC"
    } else {
        "SELECT id, user_id, type_id, title, message, read, created_at, product_id, report_id
         FROM notifications WHERE user_id = ?1
         ORDER BY created_at DESC, id DESC"
    };

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([user_id], map_notification)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn query_conversation_summaries(conn: &Connection, user_id: UserId) -> Result<Vec<ConversationSummary>> {
    // Product, first photo, last message and its sender in one pass (no N+1)
    let mut stmt = conn.prepare(
        "SELECT c.id, p.id, p.title,
                (SELECT ph.photo_url FROM product_photos ph
                  WHERE ph.product_id = p.id
                  ORDER BY ph.position, ph.id
                  LIMIT 1),
                m.id, m.content, m.sent_at, u.name, u.lastname
         FROM conversations c
         JOIN products p ON p.id = c.product_id
         LEFT JOIN messages m ON m.id = (
                SELECT m2.id FROM messages m2
                 WHERE m2.conversation_id = c.id
                 ORDER BY m2.sent_at DESC, m2.id DESC
                 LIMIT 1)
         LEFT JOIN users u ON u.id = m.sender_id
         WHERE c.buyer_id = ?1 OR c.seller_id = ?1
         ORDER BY c.id DESC",
    )?;

    let rows = stmt
        .query_map([user_id], |row| {
            let last_message_id: Option<i64> = row.get(4)?;
            let last_message = match last_message_id {
                Some(_) => {
                    let name: Option<String> = row.get(7)?;
                    let lastname: Option<String> = row.get(8)?;
                    Some(LastMessage {
                        content: row.get(5)?,
                        sender: display_name(name, lastname),
                        sent_at: timestamp_column(row, 6)?,
                    })
                }
                None => None,
            };

            Ok(ConversationSummary {
                conversation_id: row.get(0)?,
                product: ProductPreview {
                    id: row.get(1)?,
                    title: row.get(2)?,
                    image_url: row.get(3)?,
                },
                last_message,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn display_name(name: Option<String>, lastname: Option<String>) -> String {
    match (name, lastname) {
        (None, None) => "unknown".to_string(),
        (name, lastname) => format!("{} {}", name.unwrap_or_default(), lastname.unwrap_or_default())
            .trim()
            .to_string(),
    }
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        lastname: row.get(3)?,
        password_hash: row.get(4)?,
    })
}

fn map_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        product_id: row.get(1)?,
        buyer_id: row.get(2)?,
        seller_id: row.get(3)?,
    })
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender_id: row.get(2)?,
        content: row.get(3)?,
        sent_at: timestamp_column(row, 4)?,
        read: row.get(5)?,
        is_rating_message: row.get(6)?,
    })
}

fn map_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        type_id: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        read: row.get(5)?,
        created_at: timestamp_column(row, 6)?,
        product_id: row.get(7)?,
        report_id: row.get(8)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
