//! Wires Event Summarization (J) and Vectorization (K) together behind the
//! `EpisodicPipelineSink` seam the ETL service's "force update" operation
//! calls into (spec.md §4.I).

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::yaml_loader::MemoryYamlConfig;
use crate::errors::ErrorReporter;
use crate::llm_gateway::Gateway;
use crate::storage::Storage;
use crate::vector_store::VectorStore;

use super::etl::{ChannelBatch, EpisodicPipelineSink};
use super::summarization::summarize_events;
use super::types::EventSummary;
use super::vectorization::process_event_summaries;

pub struct EpisodicPipeline {
    pub gateway: Arc<Gateway>,
    pub vector_store: Arc<VectorStore>,
    pub storage: Arc<Storage>,
    pub reporter: Arc<dyn ErrorReporter>,
    pub memory_config: MemoryYamlConfig,
    pub chat_host: String,
    /// `(provider, model)` priority list for the summarization agent type.
    pub summarization_priority: Vec<(String, String)>,
}

#[async_trait]
impl EpisodicPipelineSink for EpisodicPipeline {
    async fn summarize_and_vectorize(&self, channel: ChannelBatch) -> anyhow::Result<Vec<EventSummary>> {
        let summaries = summarize_events(
            &self.gateway,
            &channel.messages,
            self.summarization_priority.clone(),
        )
        .await;

        process_event_summaries(
            &self.storage,
            &self.vector_store,
            self.reporter.as_ref(),
            &self.chat_host,
            &self.memory_config,
            &summaries,
        );

        Ok(summaries)
    }
}
