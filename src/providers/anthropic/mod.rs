use crate::providers::anthropic_common;
use crate::providers::base::{ChatChunk, ChatRequest, LLMProvider, LLMResponse, Message, ProviderMetrics, ToolDefinition};
use crate::providers::error_taxonomy::{ErrorCode, ProviderError};
use crate::providers::errors::ProviderErrorHandler;
use crate::providers::sse::parse_sse_chunk;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const CONNECT_TIMEOUT_SECS: u64 = 30;
const REQUEST_TIMEOUT_SECS: u64 = 120;

pub struct AnthropicProvider {
    api_key: String,
    default_model: String,
    base_url: String,
    client: Client,
    metrics: std::sync::Arc<std::sync::Mutex<ProviderMetrics>>,
}

impl AnthropicProvider {
    pub fn new(api_key: String, default_model: Option<String>) -> Self {
        Self {
            api_key,
            default_model: default_model
                .unwrap_or_else(|| "claude-sonnet-4-5-20250929".to_string()),
            base_url: API_URL.to_string(),
            client: Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| Client::new()),
            metrics: std::sync::Arc::new(std::sync::Mutex::new(ProviderMetrics::default())),
        }
    }

    #[cfg(test)]
    fn with_base_url(api_key: String, default_model: Option<String>, base_url: String) -> Self {
        Self {
            api_key,
            default_model: default_model
                .unwrap_or_else(|| "claude-sonnet-4-5-20250929".to_string()),
            base_url,
            client: Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| Client::new()),
            metrics: std::sync::Arc::new(std::sync::Mutex::new(ProviderMetrics::default())),
        }
    }

    fn build_payload(
        model: &str,
        messages: Vec<Message>,
        tools: Option<Vec<ToolDefinition>>,
        tool_choice: Option<String>,
        max_tokens: u32,
        temperature: f32,
        stream: bool,
    ) -> Value {
        let (system, anthropic_messages) = anthropic_common::convert_messages(messages);

        let mut payload = json!({
            "model": model,
            "messages": anthropic_messages,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "stream": stream,
        });

        if let Some(system) = system {
            payload["system"] = json!(system);
        }

        if let Some(tools) = tools {
            payload["tools"] = json!(anthropic_common::convert_tools(tools));
            let choice = tool_choice.as_deref().unwrap_or("auto");
            payload["tool_choice"] = json!({"type": choice});
        }

        payload
    }

    /// Extract incremental text from one Anthropic `content_block_delta` SSE event.
    fn delta_text(event_data: &Value) -> Option<String> {
        event_data["delta"]["text"].as_str().map(std::string::ToString::to_string)
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn chat(&self, req: ChatRequest<'_>) -> Result<LLMResponse> {
        let payload = Self::build_payload(
            req.model.unwrap_or(&self.default_model),
            req.messages,
            req.tools,
            req.tool_choice,
            req.max_tokens,
            req.temperature,
            false,
        );

        let resp = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .context("Failed to send request to Anthropic API")?;

        let json = ProviderErrorHandler::check_response(resp, "Anthropic", &self.metrics).await?;

        // Update metrics on success
        {
            if let Ok(mut metrics) = self.metrics.lock() {
                metrics.request_count += 1;
                if let Some(usage) = json.get("usage").and_then(|u| u.as_object()) {
                    if let Some(tokens) = usage.get("input_tokens").and_then(|t| t.as_u64()) {
                        metrics.token_count += tokens;
                    }
                    if let Some(tokens) = usage.get("output_tokens").and_then(|t| t.as_u64()) {
                        metrics.token_count += tokens;
                    }
                }
            }
        }

        Ok(anthropic_common::parse_response(&json))
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn chat_stream(&self, req: ChatRequest<'_>) -> anyhow::Result<BoxStream<'static, ChatChunk>> {
        let payload = Self::build_payload(
            req.model.unwrap_or(&self.default_model),
            req.messages,
            req.tools,
            req.tool_choice,
            req.max_tokens,
            req.temperature,
            true,
        );

        let resp = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&payload)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await
            .context("Failed to send streaming request to Anthropic API")?;

        if !resp.status().is_success() {
            ProviderErrorHandler::check_response(resp, "Anthropic", &self.metrics).await?;
            unreachable!("check_response always errors on a non-success status");
        }

        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.request_count += 1;
        }

        let byte_stream = resp.bytes_stream();
        let chunks = byte_stream.flat_map(|item| {
            let events: Vec<ChatChunk> = match item {
                Ok(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    parse_sse_chunk(&text)
                        .into_iter()
                        .filter_map(|event| event.data.as_ref().and_then(Self::delta_text))
                        .map(Ok)
                        .collect()
                }
                Err(e) => vec![Err(ProviderError::new(
                    ErrorCode::NetworkTimeout,
                    format!("Anthropic stream read error: {e}"),
                ))],
            };
            stream::iter(events)
        });

        Ok(Box::pin(chunks))
    }
}

#[cfg(test)]
mod tests;
