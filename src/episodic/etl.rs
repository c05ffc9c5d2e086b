//! Episodic ETL Service (spec.md §4.I): a fixed-cadence background loop
//! that drains pending message references, fetches full bodies from the
//! chat service with per-error-class retry, and hands batches to storage.
//!
//! Grounded on `examples/original_source/cogs/memory/services/episodic_memory_service.py`
//! (`fetch_new_messages` task loop, `_fetch_and_store_messages`'s
//! per-error-type classification, `force_update_memory`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, warn};

use crate::errors::ErrorReporter;
use crate::storage::{Storage, StoredMessage};

use super::types::EventSummary;

/// One message fetched from the chat service.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedMessage {
    pub message_id: i64,
    pub channel_id: i64,
    pub guild_id: i64,
    pub user_id: String,
    pub content: String,
    pub timestamp: f64,
    pub reactions_json: Option<String>,
}

/// Classified fetch failure (spec.md §4.I step 4).
#[derive(Debug, Clone)]
pub enum FetchError {
    NotFound,
    Forbidden,
    ServerError(u16),
    OtherHttp(u16),
    Unknown(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "message not found"),
            Self::Forbidden => write!(f, "forbidden"),
            Self::ServerError(code) => write!(f, "server error ({code})"),
            Self::OtherHttp(code) => write!(f, "http error ({code})"),
            Self::Unknown(msg) => write!(f, "unknown error: {msg}"),
        }
    }
}

/// External chat-service collaborator the ETL service fetches through.
/// Implemented outside the core (spec.md §6 "external collaborators").
#[async_trait]
pub trait MessageFetcher: Send + Sync {
    async fn fetch_message(&self, channel_id: i64, message_id: i64) -> Result<FetchedMessage, FetchError>;
    async fn is_text_channel(&self, channel_id: i64) -> bool;
    /// `<chat-host>` used to build `jump_url`s (spec.md §4.K).
    fn chat_host(&self) -> &str;
}

/// Hook the ETL service calls with newly stored, time-ordered messages for
/// one channel once a cycle has fetched and persisted them, used by "force
/// update" to run Summarization+Vectorization synchronously.
#[async_trait]
pub trait EpisodicPipelineSink: Send + Sync {
    async fn summarize_and_vectorize(&self, channel: ChannelBatch) -> anyhow::Result<Vec<EventSummary>>;
}

pub struct ChannelBatch {
    pub channel_id: i64,
    pub messages: Vec<StoredMessage>,
}

const FETCH_RETRIES: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(1);
const PENDING_BATCH_LIMIT: usize = 100;

pub struct EtlService {
    storage: Arc<Storage>,
    fetcher: Arc<dyn MessageFetcher>,
    reporter: Arc<dyn ErrorReporter>,
    guard: AsyncMutex<()>,
}

impl EtlService {
    pub fn new(storage: Arc<Storage>, fetcher: Arc<dyn MessageFetcher>, reporter: Arc<dyn ErrorReporter>) -> Arc<Self> {
        Arc::new(Self {
            storage,
            fetcher,
            reporter,
            guard: AsyncMutex::new(()),
        })
    }

    /// Spawn the fixed-cadence background loop (spec.md §4.I). Failures in
    /// any single cycle are caught at the loop top so cadence is never
    /// disrupted (spec.md §7 "ETL-layer ... per-cycle exceptions are caught
    /// at the loop top to protect cadence").
    pub fn spawn(self: &Arc<Self>, cadence: Duration) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cadence);
            loop {
                ticker.tick().await;
                if let Err(e) = this.run_cycle_guarded().await {
                    this.reporter.report(&e.to_string(), "etl.run_cycle");
                }
            }
        })
    }

    /// Runs one cycle if no other cycle is in flight (self-guard). Returns
    /// immediately without error if a cycle is already running.
    pub async fn run_cycle_guarded(&self) -> anyhow::Result<()> {
        let Ok(_permit) = self.guard.try_lock() else {
            return Ok(());
        };
        self.run_cycle().await
    }

    async fn run_cycle(&self) -> anyhow::Result<()> {
        let pending = self.storage.get_pending(PENDING_BATCH_LIMIT)?;
        if pending.is_empty() {
            return Ok(());
        }

        let mut by_channel: HashMap<i64, Vec<i64>> = HashMap::new();
        for p in &pending {
            by_channel.entry(p.channel_id).or_default().push(p.message_id);
        }

        let mut all_processed_ids: Vec<i64> = Vec::new();
        let mut fetched: Vec<FetchedMessage> = Vec::new();

        for (channel_id, message_ids) in by_channel {
            let pending_ids_for_channel: Vec<i64> = pending
                .iter()
                .filter(|p| p.channel_id == channel_id)
                .map(|p| p.id)
                .collect();

            if !self.fetcher.is_text_channel(channel_id).await {
                all_processed_ids.extend(&pending_ids_for_channel);
                continue;
            }

            for message_id in message_ids {
                match self.fetch_with_retry(channel_id, message_id).await {
                    Ok(msg) => fetched.push(msg),
                    Err(e) => {
                        self.report_fetch_failure(channel_id, message_id, &e);
                    }
                }
            }
            all_processed_ids.extend(&pending_ids_for_channel);
        }

        if !fetched.is_empty() {
            let rows: Vec<StoredMessage> = fetched
                .into_iter()
                .map(|m| StoredMessage {
                    message_id: m.message_id,
                    channel_id: m.channel_id,
                    guild_id: m.guild_id,
                    user_id: m.user_id,
                    content: m.content,
                    timestamp: m.timestamp,
                    reactions_json: m.reactions_json,
                    vectorized: false,
                })
                .collect();
            self.storage.store_messages_batch(&rows)?;
        }

        if !all_processed_ids.is_empty() {
            self.storage.mark_pending_processed(&all_processed_ids)?;
        }
        Ok(())
    }

    async fn fetch_with_retry(&self, channel_id: i64, message_id: i64) -> Result<FetchedMessage, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetcher.fetch_message(channel_id, message_id).await {
                Ok(msg) => return Ok(msg),
                Err(FetchError::ServerError(code)) if attempt < FETCH_RETRIES => {
                    let delay = BASE_BACKOFF * 2u32.pow(attempt - 1);
                    warn!(channel_id, message_id, code, attempt, "server error fetching message, backing off");
                    tokio::time::sleep(delay).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn report_fetch_failure(&self, channel_id: i64, message_id: i64, err: &FetchError) {
        match err {
            FetchError::NotFound => {
                warn!(channel_id, message_id, "message no longer exists, dropping");
            }
            FetchError::Forbidden => {
                error!(channel_id, message_id, "forbidden fetching message");
            }
            FetchError::ServerError(_) => {
                error!(channel_id, message_id, error = %err, "server error persisted after retries");
                self.reporter.report(&err.to_string(), "etl.fetch_message");
            }
            FetchError::OtherHttp(_) => {
                warn!(channel_id, message_id, error = %err, "unclassified http error fetching message");
            }
            FetchError::Unknown(_) => {
                self.reporter.report(&err.to_string(), "etl.fetch_message");
            }
        }
    }

    /// Force-update a channel: process its pending window synchronously,
    /// bypassing the cadence (spec.md §4.I "force update" operation).
    pub async fn force_update(
        &self,
        channel_id: i64,
        pipeline: &dyn EpisodicPipelineSink,
    ) -> anyhow::Result<Vec<EventSummary>> {
        self.run_cycle().await?;
        let unvectorized = self.storage.get_unvectorized(PENDING_BATCH_LIMIT)?;
        let messages: Vec<StoredMessage> = unvectorized
            .into_iter()
            .filter(|m| m.channel_id == channel_id)
            .collect();
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        pipeline
            .summarize_and_vectorize(ChannelBatch { channel_id, messages })
            .await
    }
}

#[cfg(test)]
mod tests;
