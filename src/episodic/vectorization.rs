//! Vectorization Service (spec.md §4.K): convert `EventSummary` objects
//! into `MemoryFragment`s, index them, then archive or delete the source
//! messages depending on retention policy.
//!
//! Grounded on `examples/original_source/cogs/memory/services/vectorization_service.py`
//! (`process_event_summaries`/`_convert_event_summaries_to_fragments`'s
//! exact `fragment_id`/`jump_url`/metadata construction).

use std::sync::Arc;

use tracing::warn;

use crate::config::yaml_loader::MemoryYamlConfig;
use crate::errors::ErrorReporter;
use crate::storage::Storage;
use crate::vector_store::{FragmentMetadata, MemoryFragment, VectorStore};

use super::types::EventSummary;

fn to_fragment(chat_host: &str, summary: &EventSummary) -> MemoryFragment {
    let m = &summary.metadata;
    let jump_url = format!(
        "https://{chat_host}/channels/{}/{}/{}",
        m.guild_id, m.channel_id, m.start_message_id
    );
    let reactions_json = if m.reactions.is_empty() {
        None
    } else {
        serde_json::to_string(&m.reactions).ok()
    };
    MemoryFragment {
        id: None,
        content: summary.query_value.clone(),
        query_key: summary.query_key.clone(),
        metadata: FragmentMetadata {
            fragment_id: format!("event-{}", m.start_message_id),
            source_message_ids: m.source_message_ids.clone(),
            jump_url,
            author_ids: m.user_ids.clone(),
            channel_id: m.channel_id,
            guild_id: m.guild_id,
            start_ts: m.start_ts,
            end_ts: m.end_ts,
            reactions_json,
            event_type: m.event_type.clone(),
        },
    }
}

/// Convert, index, mark-vectorized, then archive/delete — in that exact
/// order (spec.md §4.K "store fragment first, then mark source messages
/// vectorized, then archive/delete"). Per-fragment conversion errors are
/// reported without aborting the batch.
pub fn process_event_summaries(
    storage: &Storage,
    vector_store: &VectorStore,
    reporter: &dyn ErrorReporter,
    chat_host: &str,
    memory_config: &MemoryYamlConfig,
    summaries: &[EventSummary],
) {
    if summaries.is_empty() {
        return;
    }

    let mut fragments = Vec::with_capacity(summaries.len());
    let mut all_message_ids: Vec<i64> = Vec::new();
    for summary in summaries {
        let fragment = to_fragment(chat_host, summary);
        all_message_ids.extend(fragment.metadata.source_message_ids.iter().copied());
        fragments.push(fragment);
    }

    if let Err(e) = vector_store.add_memories(&fragments) {
        warn!(error = %e, "vectorization: add_memories failed for batch");
        reporter.report(&e.to_string(), "vectorization.add_memories");
        return;
    }

    if let Err(e) = storage.mark_vectorized(&all_message_ids) {
        reporter.report(&e.to_string(), "vectorization.mark_vectorized");
        return;
    }

    let retention_result = if memory_config.archive_on_vectorize() {
        storage.archive_messages(&all_message_ids).map(|_| ())
    } else {
        storage.delete_messages(&all_message_ids)
    };
    if let Err(e) = retention_result {
        reporter.report(&e.to_string(), "vectorization.retention");
    }
}

#[cfg(test)]
mod tests;
