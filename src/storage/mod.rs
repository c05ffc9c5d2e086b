//! The single relational store backing the episodic memory pipeline: users,
//! pending message references, captured messages, the archive, and
//! per-channel memory state (spec.md §3, §4.F).
//!
//! Grounded on `crate::agent::memory::memory_db` for the rusqlite/WAL idiom
//! and on `examples/original_source/cogs/memory/db/{schema.py,sqlite_storage.py}`
//! for exact table/column/migration semantics.

mod queries;
mod schema;

pub use queries::{ChannelState, PendingMessage, StoredMessage};

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lru::LruCache;
use rusqlite::Connection;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A user row, keyed by stable external id. Never deleted by the core.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub discord_id: String,
    pub discord_name: String,
    pub display_names: Vec<String>,
    pub procedural_memory: Option<String>,
    pub user_background: Option<String>,
}

/// One relational store. Connections are per-thread, lazily created, and
/// protected by a creation lock (spec.md §5 "per-thread DB connections").
pub struct Storage {
    db_path: PathBuf,
    creation_lock: Mutex<()>,
    user_cache: Mutex<LruCache<String, User>>,
}

impl Storage {
    pub fn new(db_path: impl AsRef<Path>, user_cache_size: usize) -> StorageResult<Arc<Self>> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let storage = Arc::new(Self {
            db_path,
            creation_lock: Mutex::new(()),
            user_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(user_cache_size.max(1)).unwrap(),
            )),
        });
        storage.ensure_schema()?;
        Ok(storage)
    }

    /// Open a fresh connection. Connections are cheap under WAL and are not
    /// pooled beyond the OS thread that opens them; the creation lock only
    /// serializes the *first* migration/schema pass.
    fn connect(&self) -> StorageResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;
        Ok(conn)
    }

    fn ensure_schema(&self) -> StorageResult<()> {
        let _guard = self.creation_lock.lock().unwrap();
        let conn = self.connect()?;
        schema::create_tables(&conn)?;
        Ok(())
    }

    /// Collect a diagnostic schema snapshot (table → column list) for error
    /// reports, per spec.md §4.F "capture a schema snapshot on exception".
    pub fn schema_snapshot(&self) -> StorageResult<Vec<(String, Vec<String>)>> {
        let conn = self.connect()?;
        let mut tables_stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type='table'")?;
        let table_names: Vec<String> = tables_stmt
            .query_map([], |row| row.get(0))?
            .filter_map(Result::ok)
            .collect();
        drop(tables_stmt);

        let mut snapshot = Vec::new();
        for table in table_names {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info('{table}')"))?;
            let cols: Vec<String> = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .filter_map(Result::ok)
                .collect();
            snapshot.push((table, cols));
        }
        Ok(snapshot)
    }

    fn report_with_snapshot(&self, context: &str, err: &StorageError) {
        error!(context, error = %err, "storage error");
        if let Ok(snapshot) = self.schema_snapshot() {
            error!(?snapshot, "schema snapshot at time of error");
        }
    }
}
