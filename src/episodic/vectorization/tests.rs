use super::*;
use crate::episodic::types::EventMetadata;
use crate::errors::TracingErrorReporter;
use crate::storage::Storage;
use crate::vector_store::embeddings::BaseEmbeddingProvider;
use tempfile::TempDir;

fn summary(start: i64, end: i64, channel: i64, guild: i64) -> EventSummary {
    EventSummary {
        query_key: "what happened".to_string(),
        query_keywords: vec!["discussion".to_string()],
        query_value: "the team discussed the roadmap".to_string(),
        metadata: EventMetadata {
            start_message_id: start,
            end_message_id: end,
            source_message_ids: (start..=end).collect(),
            channel_id: channel,
            guild_id: guild,
            user_ids: vec!["u1".to_string(), "u2".to_string()],
            start_ts: 1.0,
            end_ts: 2.0,
            reactions: vec!["👍".to_string()],
            event_type: "conversation".to_string(),
        },
    }
}

#[test]
fn to_fragment_builds_expected_id_and_jump_url() {
    let fragment = to_fragment("discord.com", &summary(10, 12, 5, 1));
    assert_eq!(fragment.metadata.fragment_id, "event-10");
    assert_eq!(fragment.metadata.jump_url, "https://discord.com/channels/1/5/10");
    assert_eq!(fragment.metadata.source_message_ids, vec![10, 11, 12]);
    assert!(fragment.metadata.reactions_json.is_some());
}

#[test]
fn process_event_summaries_archives_by_default() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path().join("t.sqlite3"), 16).unwrap();
    let vector_store = VectorStore::open_in_memory(Arc::new(BaseEmbeddingProvider::new(4))).unwrap();

    storage
        .store_messages_batch(&[
            crate::storage::StoredMessage {
                message_id: 10,
                channel_id: 5,
                guild_id: 1,
                user_id: "u1".to_string(),
                content: "hi".to_string(),
                timestamp: 1.0,
                reactions_json: None,
                vectorized: false,
            },
            crate::storage::StoredMessage {
                message_id: 11,
                channel_id: 5,
                guild_id: 1,
                user_id: "u2".to_string(),
                content: "there".to_string(),
                timestamp: 2.0,
                reactions_json: None,
                vectorized: false,
            },
        ])
        .unwrap();

    let config = MemoryYamlConfig::default();
    process_event_summaries(
        &storage,
        &vector_store,
        &TracingErrorReporter,
        "discord.com",
        &config,
        &[summary(10, 11, 5, 1)],
    );

    let unvectorized = storage.get_unvectorized(10).unwrap();
    assert!(unvectorized.is_empty(), "archived messages must not remain unvectorized in the primary table");

    let results = vector_store
        .search(&crate::vector_store::SearchQuery {
            keyword_query: Some("roadmap"),
            limit: 5,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(results.len(), 1);
}

#[test]
fn process_event_summaries_deletes_when_retention_policy_is_delete() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path().join("t.sqlite3"), 16).unwrap();
    let vector_store = VectorStore::open_in_memory(Arc::new(BaseEmbeddingProvider::new(4))).unwrap();

    storage
        .store_messages_batch(&[crate::storage::StoredMessage {
            message_id: 20,
            channel_id: 5,
            guild_id: 1,
            user_id: "u1".to_string(),
            content: "hi".to_string(),
            timestamp: 1.0,
            reactions_json: None,
            vectorized: false,
        }])
        .unwrap();

    let config = MemoryYamlConfig {
        retention_policy: "delete".to_string(),
        ..Default::default()
    };
    process_event_summaries(
        &storage,
        &vector_store,
        &TracingErrorReporter,
        "discord.com",
        &config,
        &[summary(20, 20, 5, 1)],
    );

    assert!(storage.get_unvectorized(10).unwrap().is_empty());
}
