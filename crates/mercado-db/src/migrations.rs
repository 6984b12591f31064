use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS roles (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            role_name   TEXT NOT NULL UNIQUE,
            description TEXT
        );

        CREATE TABLE IF NOT EXISTS users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            email           TEXT NOT NULL UNIQUE,
            name            TEXT NOT NULL,
            lastname        TEXT NOT NULL,
            password_hash   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_roles (
            user_id     INTEGER NOT NULL REFERENCES users(id),
            role_id     INTEGER NOT NULL REFERENCES roles(id),
            PRIMARY KEY (user_id, role_id)
        );

        CREATE TABLE IF NOT EXISTS products (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            seller_id   INTEGER NOT NULL REFERENCES users(id),
            title       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS product_photos (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            product_id  INTEGER NOT NULL REFERENCES products(id),
            photo_url   TEXT NOT NULL,
            position    INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            product_id  INTEGER NOT NULL REFERENCES products(id),
            buyer_id    INTEGER NOT NULL REFERENCES users(id),
            seller_id   INTEGER NOT NULL REFERENCES users(id),
            CHECK (buyer_id <> seller_id)
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_buyer ON conversations(buyer_id);
        CREATE INDEX IF NOT EXISTS idx_conversations_seller ON conversations(seller_id);

        CREATE TABLE IF NOT EXISTS messages (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id     INTEGER NOT NULL REFERENCES conversations(id),
            sender_id           INTEGER NOT NULL REFERENCES users(id),
            content             TEXT NOT NULL,
            sent_at             TEXT NOT NULL,
            read                INTEGER NOT NULL DEFAULT 0,
            is_rating_message   INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, sent_at);

        CREATE TABLE IF NOT EXISTS notification_types (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            type_name   TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL REFERENCES users(id),
            type_id     INTEGER NOT NULL REFERENCES notification_types(id),
            title       TEXT NOT NULL,
            message     TEXT NOT NULL,
            read        INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL,
            product_id  INTEGER,
            report_id   INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_user
            ON notifications(user_id, created_at);

        -- Seed rows the relay and login flow depend on
        INSERT OR IGNORE INTO roles (id, role_name, description) VALUES
            (1, 'student', 'Estudiante'),
            (2, 'seller', 'Vendedor'),
            (3, 'admin', 'Administrador');

        INSERT OR IGNORE INTO notification_types (id, type_name) VALUES
            (1, 'Mensaje'),
            (2, 'Alerta'),
            (3, 'Recordatorio');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
