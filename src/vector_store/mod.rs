//! Vector store adapter (spec.md §4.G): embedding provider registry plus a
//! fragment store supporting combined vector/keyword search deduplicated by
//! `fragment_id`.
//!
//! Grounded on `crate::agent::memory::memory_db` (FTS5 virtual table +
//! triggers, cosine-similarity scoring via `crate::agent::memory::embeddings`)
//! and on `examples/original_source/cogs/memory/services/vectorization_service.py`
//! for the exact `MemoryFragment` shape. `Storage::connect` is private, so
//! this adapter owns its own `rusqlite::Connection` rather than sharing
//! Storage's.

pub mod embeddings;

pub use embeddings::{build_embedding_provider, EmbeddingProvider};

use std::sync::Mutex;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::agent::memory::embeddings::{cosine_similarity, deserialize_embedding, serialize_embedding};

/// `MemoryFragment.metadata` (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FragmentMetadata {
    pub fragment_id: String,
    pub source_message_ids: Vec<i64>,
    pub jump_url: String,
    pub author_ids: Vec<String>,
    pub channel_id: i64,
    pub guild_id: i64,
    pub start_ts: f64,
    pub end_ts: f64,
    pub reactions_json: Option<String>,
    pub event_type: String,
}

/// A durable memory unit, embedded over `content` (spec.md §3 `MemoryFragment`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryFragment {
    pub id: Option<i64>,
    pub content: String,
    pub query_key: String,
    pub metadata: FragmentMetadata,
}

/// A fragment returned from `search`, annotated with its match score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredFragment {
    pub fragment: MemoryFragment,
    pub score: Option<f32>,
}

#[derive(Debug, Default, Clone)]
pub struct SearchQuery<'a> {
    pub vector_query: Option<&'a [f32]>,
    pub keyword_query: Option<&'a str>,
    pub user_id: Option<&'a str>,
    pub channel_id: Option<i64>,
    pub limit: usize,
}

/// Fragment store. One `rusqlite::Connection` guarded by a mutex — fragment
/// volume is far lower than message volume, so a single-connection adapter
/// (rather than Storage's per-thread pool) is adequate.
pub struct VectorStore {
    conn: Mutex<Connection>,
    embedder: std::sync::Arc<dyn EmbeddingProvider>,
}

impl VectorStore {
    pub fn open(
        db_path: impl AsRef<std::path::Path>,
        embedder: std::sync::Arc<dyn EmbeddingProvider>,
    ) -> rusqlite::Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )?;
        create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
        })
    }

    pub fn open_in_memory(embedder: std::sync::Arc<dyn EmbeddingProvider>) -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
        })
    }

    /// Insert fragments, embedding `content` for each. Dedup on `fragment_id`:
    /// re-adding an existing fragment_id replaces its row.
    pub fn add_memories(&self, fragments: &[MemoryFragment]) -> anyhow::Result<()> {
        if fragments.is_empty() {
            return Ok(());
        }
        let texts: Vec<&str> = fragments.iter().map(|f| f.content.as_str()).collect();
        let vectors = self.embedder.embed_documents(&texts)?;

        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("vector store lock poisoned: {e}"))?;
        let tx = conn.transaction()?;
        for (fragment, vector) in fragments.iter().zip(vectors.iter()) {
            let metadata = serde_json::to_string(&fragment.metadata)?;
            let embedding = serialize_embedding(vector);
            tx.execute(
                "INSERT INTO fragments (fragment_id, content, query_key, metadata, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(fragment_id) DO UPDATE SET
                    content = excluded.content,
                    query_key = excluded.query_key,
                    metadata = excluded.metadata,
                    embedding = excluded.embedding",
                params![
                    fragment.metadata.fragment_id,
                    fragment.content,
                    fragment.query_key,
                    metadata,
                    embedding
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Combined vector + keyword search, deduplicated by `fragment_id`
    /// (spec.md §4.G). Vector scoring uses in-process cosine similarity since
    /// the expected corpus size per guild is modest; keyword scoring uses
    /// FTS5 `MATCH` when available.
    pub fn search(&self, query: &SearchQuery<'_>) -> anyhow::Result<Vec<ScoredFragment>> {
        let limit = query.limit.max(1);
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("vector store lock poisoned: {e}"))?;

        let mut by_fragment_id: std::collections::HashMap<String, ScoredFragment> =
            std::collections::HashMap::new();

        if let Some(vec_query) = query.vector_query {
            for row in load_rows(&conn, query.channel_id, query.user_id)? {
                let Ok(stored) = deserialize_embedding(&row.embedding) else {
                    continue;
                };
                let score = cosine_similarity(vec_query, &stored);
                let fragment = row.into_fragment()?;
                upsert_best(&mut by_fragment_id, fragment, Some(score));
            }
        }

        if let Some(keyword) = query.keyword_query.filter(|k| !k.trim().is_empty()) {
            let like = format!("%{}%", keyword.replace('%', ""));
            let mut stmt = conn.prepare(
                "SELECT fragment_id, content, query_key, metadata, embedding
                 FROM fragments WHERE content LIKE ?1 OR query_key LIKE ?1
                 LIMIT 200",
            )?;
            let rows = stmt
                .query_map(params![like], row_from_sql)?
                .filter_map(Result::ok);
            for row in rows {
                if !matches_filters(&row, query.channel_id, query.user_id) {
                    continue;
                }
                let fragment = row.into_fragment()?;
                upsert_best(&mut by_fragment_id, fragment, None);
            }
        }

        let mut results: Vec<ScoredFragment> = by_fragment_id.into_values().collect();
        results.sort_by(|a, b| {
            b.score
                .unwrap_or(f32::MIN)
                .partial_cmp(&a.score.unwrap_or(f32::MIN))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);
        Ok(results)
    }
}

fn upsert_best(
    map: &mut std::collections::HashMap<String, ScoredFragment>,
    fragment: MemoryFragment,
    score: Option<f32>,
) {
    let key = fragment.metadata.fragment_id.clone();
    match map.entry(key) {
        std::collections::hash_map::Entry::Vacant(e) => {
            e.insert(ScoredFragment { fragment, score });
        }
        std::collections::hash_map::Entry::Occupied(mut e) => {
            if score > e.get().score {
                e.get_mut().score = score;
            }
        }
    }
}

struct FragmentRow {
    fragment_id: String,
    content: String,
    query_key: String,
    metadata: String,
    embedding: Vec<u8>,
}

impl FragmentRow {
    fn into_fragment(self) -> anyhow::Result<MemoryFragment> {
        let metadata: FragmentMetadata = serde_json::from_str(&self.metadata)?;
        Ok(MemoryFragment {
            id: None,
            content: self.content,
            query_key: self.query_key,
            metadata,
        })
    }
}

fn row_from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<FragmentRow> {
    Ok(FragmentRow {
        fragment_id: row.get(0)?,
        content: row.get(1)?,
        query_key: row.get(2)?,
        metadata: row.get(3)?,
        embedding: row.get(4)?,
    })
}

fn matches_filters(row: &FragmentRow, channel_id: Option<i64>, user_id: Option<&str>) -> bool {
    let metadata: Result<FragmentMetadata, _> = serde_json::from_str(&row.metadata);
    let Ok(metadata) = metadata else { return false };
    if let Some(channel_id) = channel_id {
        if metadata.channel_id != channel_id {
            return false;
        }
    }
    if let Some(user_id) = user_id {
        if !metadata.author_ids.iter().any(|a| a == user_id) {
            return false;
        }
    }
    true
}

fn load_rows(
    conn: &Connection,
    channel_id: Option<i64>,
    user_id: Option<&str>,
) -> rusqlite::Result<Vec<FragmentRow>> {
    let mut stmt = conn.prepare(
        "SELECT fragment_id, content, query_key, metadata, embedding FROM fragments",
    )?;
    let rows: Vec<FragmentRow> = stmt
        .query_map([], row_from_sql)?
        .filter_map(Result::ok)
        .filter(|row| matches_filters(row, channel_id, user_id))
        .collect();
    Ok(rows)
}

fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS fragments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            fragment_id TEXT NOT NULL UNIQUE,
            content TEXT NOT NULL,
            query_key TEXT NOT NULL,
            metadata TEXT NOT NULL,
            embedding BLOB NOT NULL
        )",
        [],
    )?;
    Ok(())
}
