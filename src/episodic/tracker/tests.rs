use super::*;
use crate::errors::TracingErrorReporter;
use crate::storage::Storage;
use tempfile::TempDir;

fn test_tracker() -> (MessageTracker, TempDir) {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path().join("test.sqlite3"), 16).unwrap();
    (MessageTracker::new(storage, Arc::new(TracingErrorReporter)), dir)
}

#[test]
fn track_message_persists_pending_and_increments_counter() {
    let (tracker, _dir) = test_tracker();
    tracker.track_message(
        MessageId(1),
        ChannelId(10),
        GuildId(100),
        &UserId("u1".to_string()),
        1.0,
    );
    assert_eq!(tracker.pending_count(), 1);

    let pending = tracker.storage.get_pending(10).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].message_id, 1);
    assert!(!pending[0].processed);
}

#[test]
fn channel_state_initializes_then_increments() {
    let (tracker, _dir) = test_tracker();
    tracker.track_message(MessageId(1), ChannelId(10), GuildId(100), &UserId("u1".to_string()), 1.0);
    let state = tracker.storage.get_channel_state(10).unwrap().unwrap();
    assert_eq!(state.message_count, 1);
    assert_eq!(state.start_message_id, 1);

    tracker.track_message(MessageId(2), ChannelId(10), GuildId(100), &UserId("u1".to_string()), 2.0);
    let state = tracker.storage.get_channel_state(10).unwrap().unwrap();
    assert_eq!(state.message_count, 2);
    assert_eq!(state.start_message_id, 1, "start_message_id is pinned to the first message until reset");
}

#[test]
fn reset_pending_count_zeroes_the_in_memory_counter() {
    let (tracker, _dir) = test_tracker();
    tracker.track_message(MessageId(1), ChannelId(10), GuildId(100), &UserId("u1".to_string()), 1.0);
    tracker.reset_pending_count();
    assert_eq!(tracker.pending_count(), 0);
}
