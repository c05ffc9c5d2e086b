//! Storage operations (spec.md §4.F): users, pending message refs, captured
//! messages, the archive, and per-channel memory state.
//!
//! Grounded on `examples/original_source/cogs/memory/db/sqlite_storage.py`
//! for exact operation semantics (upsert-union display names, archive as a
//! single transaction, preserve `vectorized` on batch upsert).

use rusqlite::{OptionalExtension, params};

use super::{Storage, StorageError, StorageResult, User};

/// An append-only pending-message reference (spec.md §3 `PendingMessageRef`).
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub id: i64,
    pub message_id: i64,
    pub channel_id: i64,
    pub guild_id: i64,
    pub user_id: String,
    pub timestamp: f64,
    pub processed: bool,
}

/// A fully captured message row (spec.md §3 `Message`/`MessageArchive`).
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub message_id: i64,
    pub channel_id: i64,
    pub guild_id: i64,
    pub user_id: String,
    pub content: String,
    pub timestamp: f64,
    pub reactions_json: Option<String>,
    pub vectorized: bool,
}

/// Per-channel unprocessed-message window (spec.md §3 `ChannelMemoryState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelState {
    pub channel_id: i64,
    pub message_count: u32,
    pub start_message_id: i64,
}

impl Storage {
    // -- Users ---------------------------------------------------------

    pub fn get_user(&self, discord_id: &str) -> StorageResult<Option<User>> {
        if let Some(cached) = self.user_cache.lock().unwrap().get(discord_id) {
            return Ok(Some(cached.clone()));
        }
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT discord_id, discord_name, display_names, procedural_memory, user_background
                 FROM users WHERE discord_id = ?1",
                params![discord_id],
                |row| {
                    let names_json: String = row.get(2)?;
                    Ok(User {
                        discord_id: row.get(0)?,
                        discord_name: row.get(1)?,
                        display_names: serde_json::from_str(&names_json).unwrap_or_default(),
                        procedural_memory: row.get(3)?,
                        user_background: row.get(4)?,
                    })
                },
            )
            .optional()
            .map_err(|e| {
                let err = StorageError::from(e);
                self.report_with_snapshot("get_user", &err);
                err
            })?;
        if let Some(ref user) = row {
            self.user_cache
                .lock()
                .unwrap()
                .put(discord_id.to_string(), user.clone());
        }
        Ok(row)
    }

    /// Union-merge `name` into `display_names`, overwrite procedural
    /// memory/background when provided. Idempotent: calling twice with the
    /// same name leaves `display_names` unchanged (spec.md §8 property 7).
    pub fn upsert_user(
        &self,
        discord_id: &str,
        discord_name: &str,
        procedural_memory: Option<&str>,
        user_background: Option<&str>,
    ) -> StorageResult<User> {
        let conn = self.connect()?;
        let existing = self.get_user(discord_id)?;

        let mut display_names = existing
            .as_ref()
            .map(|u| u.display_names.clone())
            .unwrap_or_default();
        if !display_names.iter().any(|n| n == discord_name) {
            display_names.push(discord_name.to_string());
        }
        let procedural_memory = procedural_memory
            .map(ToString::to_string)
            .or_else(|| existing.as_ref().and_then(|u| u.procedural_memory.clone()));
        let user_background = user_background
            .map(ToString::to_string)
            .or_else(|| existing.as_ref().and_then(|u| u.user_background.clone()));

        let names_json = serde_json::to_string(&display_names).unwrap_or_default();
        conn.execute(
            "INSERT INTO users (discord_id, discord_name, display_names, procedural_memory, user_background)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(discord_id) DO UPDATE SET
                discord_name = excluded.discord_name,
                display_names = excluded.display_names,
                procedural_memory = excluded.procedural_memory,
                user_background = excluded.user_background",
            params![discord_id, discord_name, names_json, procedural_memory, user_background],
        )?;

        let user = User {
            discord_id: discord_id.to_string(),
            discord_name: discord_name.to_string(),
            display_names,
            procedural_memory,
            user_background,
        };
        self.user_cache
            .lock()
            .unwrap()
            .put(discord_id.to_string(), user.clone());
        Ok(user)
    }

    // -- Pending message refs --------------------------------------------

    pub fn add_pending(
        &self,
        message_id: i64,
        channel_id: i64,
        guild_id: i64,
        user_id: &str,
        timestamp: f64,
    ) -> StorageResult<i64> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO pending_messages (message_id, channel_id, guild_id, user_id, timestamp, processed)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            params![message_id, channel_id, guild_id, user_id, timestamp],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Oldest-first, unprocessed only, capped at `limit`.
    pub fn get_pending(&self, limit: usize) -> StorageResult<Vec<PendingMessage>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, message_id, channel_id, guild_id, user_id, timestamp, processed
             FROM pending_messages WHERE processed = 0 ORDER BY id ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(PendingMessage {
                    id: row.get(0)?,
                    message_id: row.get(1)?,
                    channel_id: row.get(2)?,
                    guild_id: row.get(3)?,
                    user_id: row.get(4)?,
                    timestamp: row.get(5)?,
                    processed: row.get::<_, i64>(6)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Monotonic: 0 -> 1 only, never reverts (spec.md §8 property 1).
    pub fn mark_pending_processed(&self, ids: &[i64]) -> StorageResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("UPDATE pending_messages SET processed = 1 WHERE id = ?1")?;
            for id in ids {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // -- Messages --------------------------------------------------------

    /// Upsert preserving the existing `vectorized` flag — a re-fetch of an
    /// already-vectorized message must never un-vectorize it.
    pub fn store_messages_batch(&self, msgs: &[StoredMessage]) -> StorageResult<()> {
        if msgs.is_empty() {
            return Ok(());
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO messages (message_id, channel_id, guild_id, user_id, content, timestamp, reactions, vectorized)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(message_id) DO UPDATE SET
                    channel_id = excluded.channel_id,
                    guild_id = excluded.guild_id,
                    user_id = excluded.user_id,
                    content = excluded.content,
                    timestamp = excluded.timestamp,
                    reactions = excluded.reactions",
            )?;
            for m in msgs {
                stmt.execute(params![
                    m.message_id,
                    m.channel_id,
                    m.guild_id,
                    m.user_id,
                    m.content,
                    m.timestamp,
                    m.reactions_json,
                    m.vectorized as i64,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_unvectorized(&self, limit: usize) -> StorageResult<Vec<StoredMessage>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT message_id, channel_id, guild_id, user_id, content, timestamp, reactions, vectorized
             FROM messages WHERE vectorized = 0 ORDER BY message_id ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], Self::row_to_message)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Monotonic: 0 -> 1 only (spec.md §3 `Message` invariant).
    pub fn mark_vectorized(&self, ids: &[i64]) -> StorageResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE messages SET vectorized = 1 WHERE message_id = ?1")?;
            for id in ids {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Select -> insert into archive -> delete from primary, atomically
    /// (spec.md §3 `MessageArchive` invariant, §8 property 2). At-most-once:
    /// a message_id already in the archive is skipped via
    /// `INSERT OR IGNORE`, so concurrent/duplicate archival calls can never
    /// leave a message_id in both tables.
    pub fn archive_messages(&self, ids: &[i64]) -> StorageResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut archived = 0usize;
        {
            let mut insert_stmt = tx.prepare(
                "INSERT OR IGNORE INTO messages_archive
                    (message_id, channel_id, guild_id, user_id, content, timestamp, reactions, archived_at)
                 SELECT message_id, channel_id, guild_id, user_id, content, timestamp, reactions, strftime('%s','now')
                 FROM messages WHERE message_id = ?1",
            )?;
            let mut delete_stmt = tx.prepare("DELETE FROM messages WHERE message_id = ?1")?;
            for id in ids {
                let changed = insert_stmt.execute(params![id])?;
                if changed > 0 {
                    archived += 1;
                }
                delete_stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(archived)
    }

    /// Hard-delete retention policy, opt-in (spec.md §4.K, DESIGN.md open
    /// question decision).
    pub fn delete_messages(&self, ids: &[i64]) -> StorageResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM messages WHERE message_id = ?1")?;
            for id in ids {
                stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<StoredMessage> {
        Ok(StoredMessage {
            message_id: row.get(0)?,
            channel_id: row.get(1)?,
            guild_id: row.get(2)?,
            user_id: row.get(3)?,
            content: row.get(4)?,
            timestamp: row.get(5)?,
            reactions_json: row.get(6)?,
            vectorized: row.get::<_, i64>(7)? != 0,
        })
    }

    // -- Channel memory state ---------------------------------------------

    pub fn get_channel_state(&self, channel_id: i64) -> StorageResult<Option<ChannelState>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT channel_id, message_count, start_message_id FROM channel_memory_state WHERE channel_id = ?1",
                params![channel_id],
                |row| {
                    Ok(ChannelState {
                        channel_id: row.get(0)?,
                        message_count: row.get::<_, i64>(1)? as u32,
                        start_message_id: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn upsert_channel_state(
        &self,
        channel_id: i64,
        message_count: u32,
        start_message_id: i64,
    ) -> StorageResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO channel_memory_state (channel_id, message_count, start_message_id)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(channel_id) DO UPDATE SET
                message_count = excluded.message_count,
                start_message_id = excluded.start_message_id",
            params![channel_id, message_count, start_message_id],
        )?;
        Ok(())
    }

    /// Reset the counter to 0 after a processing cycle completes, keeping
    /// `start_message_id` pinned to the next unprocessed message.
    pub fn reset_channel_state(&self, channel_id: i64, next_start_id: i64) -> StorageResult<()> {
        self.upsert_channel_state(channel_id, 0, next_start_id)
    }

    // -- Generic config key/value -----------------------------------------

    pub fn get_config(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row)
    }

    pub fn set_config(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}
