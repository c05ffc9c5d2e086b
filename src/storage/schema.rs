//! Table definitions and migrations. Mirrors the column-for-column layout of
//! `examples/original_source/cogs/memory/db/schema.py`.

use rusqlite::Connection;

use super::StorageResult;

pub fn create_tables(conn: &Connection) -> StorageResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            discord_id TEXT PRIMARY KEY,
            discord_name TEXT,
            display_names TEXT,
            procedural_memory TEXT,
            user_background TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pending_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id INTEGER NOT NULL,
            channel_id INTEGER NOT NULL,
            guild_id INTEGER NOT NULL,
            user_id TEXT NOT NULL,
            timestamp REAL NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pending_messages_processed ON pending_messages (processed)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages (
            message_id INTEGER PRIMARY KEY,
            channel_id INTEGER NOT NULL,
            guild_id INTEGER NOT NULL,
            user_id TEXT NOT NULL,
            content TEXT NOT NULL,
            timestamp REAL NOT NULL,
            reactions TEXT,
            vectorized INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    migrate_vectorized_column(conn);
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_messages_user_id ON messages (user_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_messages_vectorized ON messages (vectorized)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages_archive (
            message_id INTEGER PRIMARY KEY,
            channel_id INTEGER NOT NULL,
            guild_id INTEGER NOT NULL,
            user_id TEXT NOT NULL,
            content TEXT NOT NULL,
            timestamp REAL NOT NULL,
            reactions TEXT,
            archived_at REAL NOT NULL DEFAULT (strftime('%s','now'))
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_messages_archive_user_id ON messages_archive (user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS channel_memory_state (
            channel_id INTEGER PRIMARY KEY,
            message_count INTEGER NOT NULL DEFAULT 0,
            start_message_id INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// Backfill the `vectorized` column for stores created before it existed.
fn migrate_vectorized_column(conn: &Connection) {
    let has_column = conn
        .prepare("PRAGMA table_info('messages')")
        .and_then(|mut stmt| {
            let cols: Result<Vec<String>, _> = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect();
            cols
        })
        .map(|cols| cols.iter().any(|c| c == "vectorized"))
        .unwrap_or(true);

    if !has_column {
        let _ = conn.execute(
            "ALTER TABLE messages ADD COLUMN vectorized INTEGER NOT NULL DEFAULT 0",
            [],
        );
    }
}
