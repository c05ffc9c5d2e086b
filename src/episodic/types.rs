//! Transient value objects passed between Summarization (J) and
//! Vectorization (K) (spec.md §3 `EventSummary`, §4.J).
//!
//! Grounded on `examples/original_source/cogs/memory/services/event_summarization_service.py`
//! (`EventMetadata`/`EventSummary` dataclasses and the `MemoryFragment`
//! Pydantic schema the planner LLM is asked to emit).

use serde::{Deserialize, Serialize};

/// One `{query_key, query_keywords[], query_value, start_message_id,
/// end_message_id}` entry of the LLM's `MemoryFragmentList` response.
/// Distinct from `crate::vector_store::MemoryFragment`: this is the raw,
/// unresolved LLM output before message lookup and metadata computation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryFragment {
    pub query_key: String,
    pub query_keywords: Vec<String>,
    pub query_value: String,
    pub start_message_id: i64,
    pub end_message_id: i64,
}

/// The schema the planner LLM is forced to conform to (spec.md §4.J).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MemoryFragmentList {
    pub fragments: Vec<SummaryFragment>,
}

/// Metadata computed by resolving a `SummaryFragment`'s message range
/// against the captured messages in the group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventMetadata {
    pub start_message_id: i64,
    pub end_message_id: i64,
    pub source_message_ids: Vec<i64>,
    pub channel_id: i64,
    pub guild_id: i64,
    pub user_ids: Vec<String>,
    pub start_ts: f64,
    pub end_ts: f64,
    pub reactions: Vec<String>,
    pub event_type: String,
}

/// Output of Event Summarization (J), input to Vectorization (K).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventSummary {
    pub query_key: String,
    pub query_keywords: Vec<String>,
    pub query_value: String,
    pub metadata: EventMetadata,
}
