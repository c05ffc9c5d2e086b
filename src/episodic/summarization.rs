//! Event Summarization (spec.md §4.J): group captured messages into events
//! and ask a planner LLM to emit a `MemoryFragmentList`.
//!
//! Grounded on `examples/original_source/cogs/memory/services/event_summarization_service.py`
//! (`summarize_events`/`_group_messages`/`_process_message_group`/
//! `_get_llm_summary`/`_create_event_summary`/`_create_event_metadata`,
//! including the start/end-id-not-found fallback to sorted-by-timestamp).

use std::collections::HashSet;

use tracing::warn;

use crate::llm_gateway::{Gateway, GenerateRequest};
use crate::storage::StoredMessage;

use super::types::{EventMetadata, EventSummary, MemoryFragmentList, SummaryFragment};

const SYSTEM_PROMPT: &str = "You are an event summarizer. Given a sequence of chat messages, \
identify distinct conversational events worth remembering. Respond with JSON conforming \
exactly to the schema {\"fragments\": [{\"query_key\": string, \"query_keywords\": [string], \
\"query_value\": string, \"start_message_id\": integer, \"end_message_id\": integer}]}. \
Do not include any other text.";

/// Minimal grouping: all inputs form one event (spec.md §4.J step 1 —
/// "the design allows future smarter grouping").
fn group_messages(messages: &[StoredMessage]) -> Vec<&[StoredMessage]> {
    if messages.is_empty() {
        Vec::new()
    } else {
        vec![messages]
    }
}

/// Summarize a batch of captured messages into zero or more `EventSummary`
/// objects.
pub async fn summarize_events(
    gateway: &Gateway,
    messages: &[StoredMessage],
    priority: Vec<(String, String)>,
) -> Vec<EventSummary> {
    let mut summaries = Vec::new();
    for group in group_messages(messages) {
        summaries.extend(process_group(gateway, group, priority.clone()).await);
    }
    summaries
}

async fn process_group(
    gateway: &Gateway,
    group: &[StoredMessage],
    priority: Vec<(String, String)>,
) -> Vec<EventSummary> {
    let transcript = group
        .iter()
        .map(|m| format!("[{}] {}: {}", m.message_id, m.user_id, m.content))
        .collect::<Vec<_>>()
        .join("\n");

    let mut request = GenerateRequest::new(transcript);
    request.system_prompt = Some(SYSTEM_PROMPT.to_string());

    let parsed: MemoryFragmentList = match gateway.generate_structured(request, priority).await {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "event summarization: schema violation or generation failure, returning no events for group");
            return Vec::new();
        }
    };

    parsed
        .fragments
        .into_iter()
        .filter_map(|fragment| create_event_summary(group, fragment))
        .collect()
}

fn create_event_summary(group: &[StoredMessage], fragment: SummaryFragment) -> Option<EventSummary> {
    let metadata = create_event_metadata(group, &fragment)?;
    Some(EventSummary {
        query_key: fragment.query_key,
        query_keywords: fragment.query_keywords,
        query_value: fragment.query_value,
        metadata,
    })
}

fn create_event_metadata(group: &[StoredMessage], fragment: &SummaryFragment) -> Option<EventMetadata> {
    let in_range: Vec<&StoredMessage> = group
        .iter()
        .filter(|m| m.message_id >= fragment.start_message_id && m.message_id <= fragment.end_message_id)
        .collect();

    // Fall back to the full group sorted by timestamp when the indicated
    // range doesn't resolve to any captured message (spec.md §4.J step 4).
    let (selected, start_id, end_id) = if in_range.is_empty() {
        let mut sorted: Vec<&StoredMessage> = group.iter().collect();
        sorted.sort_by(|a, b| a.timestamp.partial_cmp(&b.timestamp).unwrap_or(std::cmp::Ordering::Equal));
        let Some(first) = sorted.first() else { return None };
        let Some(last) = sorted.last() else { return None };
        let start_id = first.message_id;
        let end_id = last.message_id;
        (sorted, start_id, end_id)
    } else {
        (in_range, fragment.start_message_id, fragment.end_message_id)
    };

    let anchor = selected.first()?;
    let user_ids: Vec<String> = selected
        .iter()
        .map(|m| m.user_id.clone())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let reactions: Vec<String> = selected
        .iter()
        .filter_map(|m| m.reactions_json.clone())
        .collect();
    let start_ts = selected.iter().map(|m| m.timestamp).fold(f64::INFINITY, f64::min);
    let end_ts = selected.iter().map(|m| m.timestamp).fold(f64::NEG_INFINITY, f64::max);
    let source_message_ids: Vec<i64> = selected.iter().map(|m| m.message_id).collect();

    Some(EventMetadata {
        start_message_id: start_id,
        end_message_id: end_id,
        source_message_ids,
        channel_id: anchor.channel_id,
        guild_id: anchor.guild_id,
        user_ids,
        start_ts,
        end_ts,
        reactions,
        event_type: "conversation".to_string(),
    })
}
