//! The LLM Gateway: a provider-agnostic response generator with centralized
//! retry, classified errors, failover across a priority list of providers,
//! and the deferred-output streaming discipline that prevents token
//! duplication on retry.
//!
//! Grounded on `examples/original_source/gpt/core/response_generator.py`
//! (`generate_response`/`unified_gen`/`final_gen`) and generalizes the
//! teacher's `providers::fallback`/`providers::circuit_breaker` decorator
//! pattern into an explicit priority-list failover loop.

mod deferred;

pub use deferred::DeferredStream;

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::config::schema::Config;
use crate::providers::base::{ChatChunk, ChatRequest, LLMProvider, Message, ToolDefinition};
use crate::providers::error_taxonomy::{ErrorCode, ProviderError, RetryController};
use crate::providers::strategy::ProviderFactory;

/// A single generation request.
pub struct GenerateRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub history: Vec<Message>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub trace_id: Option<String>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            history: Vec::new(),
            tools: None,
            max_tokens: 4096,
            temperature: 0.7,
            trace_id: None,
        }
    }

    fn into_messages(self) -> (Vec<Message>, Option<String>) {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.extend(self.history);
        messages.push(Message::user(self.prompt));
        (messages, self.system_prompt)
    }
}

/// Events emitted by the gateway over its logging seam. Matches the wire
/// names in spec.md §4.D exactly so log consumers don't need translation.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    ProviderTry { provider: String, model: String },
    ProviderRetry { code: ErrorCode, delay_ms: u64 },
    ProviderFailover { from: String, to: String, reason: String },
    ProviderFail { code: ErrorCode, retriable: bool, status: Option<u16> },
}

/// Receives gateway lifecycle events. The default implementation forwards to
/// `tracing`; production wiring routes this through the structured logging
/// sink (component B) as well.
pub trait GatewaySink: Send + Sync {
    fn emit(&self, event: GatewayEvent, trace_id: Option<&str>);
}

pub struct TracingGatewaySink;

impl GatewaySink for TracingGatewaySink {
    fn emit(&self, event: GatewayEvent, trace_id: Option<&str>) {
        match event {
            GatewayEvent::ProviderTry { provider, model } => {
                tracing::info!(trace_id, provider, model, "provider_try");
            }
            GatewayEvent::ProviderRetry { code, delay_ms } => {
                tracing::warn!(trace_id, code = %code, delay_ms, "provider_retry");
            }
            GatewayEvent::ProviderFailover { from, to, reason } => {
                tracing::warn!(trace_id, from, to, reason, "provider_failover");
            }
            GatewayEvent::ProviderFail {
                code,
                retriable,
                status,
            } => {
                tracing::error!(trace_id, code = %code, retriable, status, "provider_fail");
            }
        }
    }
}

/// One candidate in the provider priority list.
struct Candidate {
    provider_name: String,
    model: String,
    provider: Arc<dyn LLMProvider>,
}

pub struct Gateway {
    config: Arc<Config>,
    retry: RetryController,
    sink: Arc<dyn GatewaySink>,
}

impl Gateway {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            retry: RetryController::default(),
            sink: Arc::new(TracingGatewaySink),
        }
    }

    pub fn with_retry(mut self, retry: RetryController) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn GatewaySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Resolve the priority list of `(provider, model)` pairs into live
    /// provider instances. Unresolvable candidates (e.g. missing API key)
    /// are skipped rather than aborting the whole list.
    fn resolve_candidates(&self, priority: &[(String, String)]) -> Vec<Candidate> {
        let factory = ProviderFactory::new(&self.config);
        priority
            .iter()
            .filter_map(|(provider_name, model)| {
                let full_ref = format!("{provider_name}/{model}");
                factory
                    .create_provider(&full_ref)
                    .ok()
                    .map(|provider| Candidate {
                        provider_name: provider_name.clone(),
                        model: model.clone(),
                        provider,
                    })
            })
            .collect()
    }

    fn trace_id(explicit: Option<String>) -> String {
        explicit.unwrap_or_else(|| Uuid::new_v4().to_string())
    }

    /// Streaming generation over an ordered provider priority list (spec.md
    /// §4.D operation 1-3, 5). Always returns a stream: on total failure the
    /// stream yields the single LLM error envelope string.
    pub async fn generate_stream(
        &self,
        request: GenerateRequest,
        priority: Vec<(String, String)>,
    ) -> BoxStream<'static, String> {
        let trace_id = Self::trace_id(request.trace_id.clone());
        let candidates = self.resolve_candidates(&priority);
        let (messages, system_prompt) = request.into_messages();
        let max_tokens = 4096u32;
        let temperature = 0.7f32;

        let mut last_err: Option<ProviderError> = None;
        let mut prev_provider: Option<String> = None;

        for candidate in candidates {
            self.sink.emit(
                GatewayEvent::ProviderTry {
                    provider: candidate.provider_name.clone(),
                    model: candidate.model.clone(),
                },
                Some(&trace_id),
            );

            if let Some(prev) = &prev_provider
                && let Some(err) = &last_err
            {
                self.sink.emit(
                    GatewayEvent::ProviderFailover {
                        from: prev.clone(),
                        to: candidate.provider_name.clone(),
                        reason: err.code.to_string(),
                    },
                    Some(&trace_id),
                );
            }

            let sink = self.sink.clone();
            let trace_id_for_retry = trace_id.clone();
            let attempt_messages = messages.clone();
            let attempt_tools = request.tools.clone();
            let attempt_system = system_prompt.clone();

            let result = self
                .retry
                .run(
                    || {
                        let provider = candidate.provider.clone();
                        let mut msgs = attempt_messages.clone();
                        if let Some(sys) = &attempt_system {
                            msgs.insert(0, Message::system(sys.clone()));
                        }
                        let tools = attempt_tools.clone();
                        let model = candidate.model.clone();
                        let provider_name = candidate.provider_name.clone();
                        async move {
                            run_one_attempt(
                                provider.as_ref(),
                                msgs,
                                tools,
                                &model,
                                max_tokens,
                                temperature,
                            )
                            .await
                            .map_err(|e| e.with_provider(provider_name))
                        }
                    },
                    |_attempt, delay, err| {
                        sink.emit(
                            GatewayEvent::ProviderRetry {
                                code: err.code,
                                delay_ms: delay.as_millis() as u64,
                            },
                            Some(&trace_id_for_retry),
                        );
                    },
                )
                .await;

            match result {
                Ok(deferred) => return deferred.into_stream(),
                Err(err) => {
                    self.sink.emit(
                        GatewayEvent::ProviderFail {
                            code: err.code,
                            retriable: err.retriable,
                            status: err.status,
                        },
                        Some(&trace_id),
                    );
                    prev_provider = Some(candidate.provider_name.clone());
                    last_err = Some(err);
                }
            }
        }

        let final_err = last_err.unwrap_or_else(|| {
            ProviderError::new(ErrorCode::ProviderUnavailable, "No available provider.")
                .with_trace_id(trace_id.clone())
        });
        let message = if final_err.provider.is_some() {
            "Provider failed after retries."
        } else {
            "No available provider."
        };
        let envelope = final_err
            .with_trace_id(trace_id)
            .envelope(message)
            .to_string();
        Box::pin(stream::once(async move { envelope }))
    }

    /// Structured-value mode: validate the returned JSON against `T`. A
    /// schema mismatch is normalized to `malformed_response` and triggers
    /// failover to the next provider, exactly like any other non-retriable
    /// error (spec.md §4.D operation 4).
    pub async fn generate_structured<T: DeserializeOwned>(
        &self,
        request: GenerateRequest,
        priority: Vec<(String, String)>,
    ) -> Result<T, ProviderError> {
        let trace_id = Self::trace_id(request.trace_id.clone());
        let candidates = self.resolve_candidates(&priority);
        let (messages, system_prompt) = request.into_messages();

        let mut last_err: Option<ProviderError> = None;
        for candidate in candidates {
            self.sink.emit(
                GatewayEvent::ProviderTry {
                    provider: candidate.provider_name.clone(),
                    model: candidate.model.clone(),
                },
                Some(&trace_id),
            );

            let mut msgs = messages.clone();
            if let Some(sys) = &system_prompt {
                msgs.insert(0, Message::system(sys.clone()));
            }

            let sink = self.sink.clone();
            let trace_id_for_retry = trace_id.clone();
            let provider_name = candidate.provider_name.clone();
            let result = self
                .retry
                .run(
                    || {
                        let provider = candidate.provider.clone();
                        let msgs = msgs.clone();
                        let model = candidate.model.clone();
                        let provider_name = provider_name.clone();
                        async move {
                            let chat_req = ChatRequest {
                                messages: msgs,
                                tools: None,
                                model: Some(&model),
                                max_tokens: 4096,
                                temperature: 0.2,
                                tool_choice: None,
                                response_format: None,
                            };
                            let response = provider
                                .chat(chat_req)
                                .await
                                .map_err(|e| {
                                    ProviderError::new(ErrorCode::ProviderUnavailable, e.to_string())
                                        .with_provider(provider_name.clone())
                                })?;
                            let content = response.content.unwrap_or_default();
                            serde_json::from_str::<T>(&content).map_err(|e| {
                                ProviderError::new(
                                    ErrorCode::MalformedResponse,
                                    format!("schema mismatch: {e}"),
                                )
                                .with_provider(provider_name)
                            })
                        }
                    },
                    |_attempt, delay, err| {
                        sink.emit(
                            GatewayEvent::ProviderRetry {
                                code: err.code,
                                delay_ms: delay.as_millis() as u64,
                            },
                            Some(&trace_id_for_retry),
                        );
                    },
                )
                .await;

            match result {
                Ok(value) => return Ok(value),
                Err(err) => {
                    self.sink.emit(
                        GatewayEvent::ProviderFail {
                            code: err.code,
                            retriable: err.retriable,
                            status: err.status,
                        },
                        Some(&trace_id),
                    );
                    last_err = Some(err);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| {
                ProviderError::new(ErrorCode::ProviderUnavailable, "No available provider.")
            })
            .with_trace_id(trace_id))
    }
}

/// Drive a single provider attempt through the deferred-output buffer. On
/// success the [`DeferredStream`] has already confirmed at least one chunk;
/// on failure no buffer is returned and the caller's retry/failover loop
/// takes over. This is where "no cross-retry token duplication" is enforced.
async fn run_one_attempt(
    provider: &dyn LLMProvider,
    messages: Vec<Message>,
    tools: Option<Vec<ToolDefinition>>,
    model: &str,
    max_tokens: u32,
    temperature: f32,
) -> Result<DeferredStream, ProviderError> {
    let chat_req = ChatRequest {
        messages,
        tools,
        model: Some(model),
        max_tokens,
        temperature,
        tool_choice: None,
        response_format: None,
    };
    let raw: BoxStream<'static, ChatChunk> = provider
        .chat_stream(chat_req)
        .await
        .map_err(|e| ProviderError::new(ErrorCode::ProviderUnavailable, e.to_string()))?;

    DeferredStream::buffer(raw, 1).await
}

/// Tool-result history interleaving (spec.md §4.D): a `function`-role
/// history entry, serialized into the provider's chat format. Vendors
/// without a native tool role get an annotated `model`-role prefix instead.
pub fn function_result_message(name: &str, content: &str, native_tool_role: bool) -> Message {
    if native_tool_role {
        Message::tool_result(name, content, false)
    } else {
        Message {
            role: "assistant".into(),
            content: format!("[tool:{name}] {content}"),
            ..Default::default()
        }
    }
}

#[allow(dead_code)]
fn ceiling() -> Duration {
    Duration::from_secs(120)
}
