//! The Episodic Memory Pipeline (spec.md §1, components F-K): Tracker
//! persists pending references, the ETL service fetches and stores full
//! messages, Event Summarization turns message batches into `EventSummary`
//! objects, and Vectorization indexes them into the vector store and
//! archives or deletes the source rows.

pub mod etl;
pub mod ids;
pub mod pipeline;
pub mod summarization;
pub mod tracker;
pub mod types;
pub mod vectorization;

pub use etl::{ChannelBatch, EpisodicPipelineSink, EtlService, FetchError, FetchedMessage, MessageFetcher};
pub use ids::{ChannelId, GuildId, MessageId, UserId};
pub use pipeline::EpisodicPipeline;
pub use summarization::summarize_events;
pub use tracker::MessageTracker;
pub use types::{EventMetadata, EventSummary, MemoryFragmentList, SummaryFragment};
pub use vectorization::process_event_summaries;
