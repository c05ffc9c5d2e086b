//! Message Tracker (spec.md §4.H): for each inbound non-bot message,
//! persist a pending reference, bump the in-memory pending counter, and
//! update the per-channel window. Never reads message content.
//!
//! Grounded on `examples/original_source/cogs/memory/services/message_tracker.py`
//! (`track_message`'s try/except-and-report shape — a tracking failure must
//! never propagate to the caller that dispatched the Discord event).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::errors::ErrorReporter;
use crate::storage::Storage;

use super::ids::{ChannelId, GuildId, MessageId, UserId};

pub struct MessageTracker {
    storage: Arc<Storage>,
    reporter: Arc<dyn ErrorReporter>,
    pending_count: AtomicU64,
}

impl MessageTracker {
    pub fn new(storage: Arc<Storage>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            storage,
            reporter,
            pending_count: AtomicU64::new(0),
        }
    }

    /// Track one inbound message. Storage failures are reported via the
    /// error seam rather than propagated — a tracking miss must not crash
    /// the chat event dispatch path.
    pub fn track_message(
        &self,
        message_id: MessageId,
        channel_id: ChannelId,
        guild_id: GuildId,
        user_id: &UserId,
        timestamp: f64,
    ) {
        if let Err(e) = self.try_track(message_id, channel_id, guild_id, user_id, timestamp) {
            self.reporter.report(&e.to_string(), "message_tracker.track_message");
        }
    }

    fn try_track(
        &self,
        message_id: MessageId,
        channel_id: ChannelId,
        guild_id: GuildId,
        user_id: &UserId,
        timestamp: f64,
    ) -> anyhow::Result<()> {
        self.storage.add_pending(
            message_id.0,
            channel_id.0,
            guild_id.0,
            &user_id.0,
            timestamp,
        )?;
        self.pending_count.fetch_add(1, Ordering::Relaxed);

        match self.storage.get_channel_state(channel_id.0)? {
            Some(state) => {
                self.storage
                    .upsert_channel_state(channel_id.0, state.message_count + 1, state.start_message_id)?;
            }
            None => {
                self.storage.upsert_channel_state(channel_id.0, 1, message_id.0)?;
            }
        }
        Ok(())
    }

    pub fn pending_count(&self) -> u64 {
        self.pending_count.load(Ordering::Relaxed)
    }

    pub fn reset_pending_count(&self) {
        self.pending_count.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests;
