//! Embedding provider registry (spec.md §4.G): string key → factory over a
//! `MemoryYamlConfig`, producing an object exposing `embed_documents`/
//! `embed_query`.
//!
//! Grounded on `crate::agent::memory::embeddings::EmbeddingService` for the
//! local `huggingface` provider and on `src/providers/openai/mod.rs`'s
//! reqwest-client idiom for the HTTP-backed providers.

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

use crate::config::yaml_loader::MemoryYamlConfig;

const CONNECT_TIMEOUT_SECS: u64 = 10;
const REQUEST_TIMEOUT_SECS: u64 = 30;

pub trait EmbeddingProvider: Send + Sync {
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// Yields zero vectors of the configured dimension. Used for tests and as a
/// safe fallback when no real embedding backend is configured.
pub struct BaseEmbeddingProvider {
    dim: usize,
}

impl BaseEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }
}

impl EmbeddingProvider for BaseEmbeddingProvider {
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.0f32; self.dim]).collect())
    }

    fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.0f32; self.dim])
    }
}

/// Wraps the local fastembed-backed `EmbeddingService` (ONNX, no API key).
pub struct HuggingFaceEmbeddingProvider {
    service: crate::agent::memory::embeddings::EmbeddingService,
}

impl HuggingFaceEmbeddingProvider {
    pub fn new(model_name: &str) -> Result<Self> {
        Ok(Self {
            service: crate::agent::memory::embeddings::EmbeddingService::new(model_name)?,
        })
    }
}

impl EmbeddingProvider for HuggingFaceEmbeddingProvider {
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.service.embed_texts(texts)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.service.embed_query(text)
    }
}

/// Shared shape for the HTTP-backed providers: a blocking client used from
/// synchronous call sites (vector store operations are not on the async hot
/// path — fragment writes happen from the Vectorization Service's own task).
struct HttpEmbeddingProvider {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    body_builder: fn(&str, &[&str]) -> serde_json::Value,
    parse: fn(&serde_json::Value) -> Result<Vec<Vec<f32>>>,
}

impl HttpEmbeddingProvider {
    fn call(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = (self.body_builder)(&self.model, texts);
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .context("embedding request failed")?
            .error_for_status()
            .context("embedding provider returned an error status")?;
        let value: serde_json::Value = response.json().context("invalid embedding response JSON")?;
        (self.parse)(&value)
    }
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.call(texts)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.call(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("empty embedding response"))
    }
}

fn http_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn openai_body(model: &str, texts: &[&str]) -> serde_json::Value {
    json!({ "model": model, "input": texts })
}

fn openai_parse(value: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = value["data"].as_array().context("missing `data` in OpenAI embeddings response")?;
    data.iter()
        .map(|item| {
            item["embedding"]
                .as_array()
                .context("missing `embedding` array")?
                .iter()
                .map(|v| v.as_f64().map(|f| f as f32).context("non-numeric embedding value"))
                .collect()
        })
        .collect()
}

fn google_body(model: &str, texts: &[&str]) -> serde_json::Value {
    json!({
        "requests": texts.iter().map(|t| json!({"model": model, "content": {"parts": [{"text": t}]}})).collect::<Vec<_>>()
    })
}

fn google_parse(value: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let responses = value["embeddings"]
        .as_array()
        .context("missing `embeddings` in Google response")?;
    responses
        .iter()
        .map(|item| {
            item["values"]
                .as_array()
                .context("missing `values` array")?
                .iter()
                .map(|v| v.as_f64().map(|f| f as f32).context("non-numeric embedding value"))
                .collect()
        })
        .collect()
}

fn ollama_body(model: &str, texts: &[&str]) -> serde_json::Value {
    json!({ "model": model, "input": texts })
}

fn ollama_parse(value: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = value["embeddings"]
        .as_array()
        .context("missing `embeddings` in Ollama response")?;
    data.iter()
        .map(|item| {
            item.as_array()
                .context("Ollama embedding entry is not an array")?
                .iter()
                .map(|v| v.as_f64().map(|f| f as f32).context("non-numeric embedding value"))
                .collect()
        })
        .collect()
}

/// Build the configured embedding provider. Unknown/missing keys fall back
/// to `BaseEmbeddingProvider` rather than failing startup (spec.md §4.E:
/// "fall back to defaults where continuing is safe").
pub fn build_embedding_provider(config: &MemoryYamlConfig) -> Arc<dyn EmbeddingProvider> {
    match config.embedding_provider.as_str() {
        "huggingface" => match HuggingFaceEmbeddingProvider::new(&config.embedding_model) {
            Ok(provider) => Arc::new(provider),
            Err(e) => {
                tracing::warn!(error = %e, "huggingface embedding provider init failed, falling back to base");
                Arc::new(BaseEmbeddingProvider::new(config.embedding_dim))
            }
        },
        "openai" => Arc::new(HttpEmbeddingProvider {
            client: http_client(),
            url: "https://api.openai.com/v1/embeddings".to_string(),
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            model: config.embedding_model.clone(),
            body_builder: openai_body,
            parse: openai_parse,
        }),
        "google" => Arc::new(HttpEmbeddingProvider {
            client: http_client(),
            url: format!(
                "https://generativelanguage.googleapis.com/v1beta/models/{}:batchEmbedContents",
                config.embedding_model
            ),
            api_key: std::env::var("GOOGLE_API_KEY").unwrap_or_default(),
            model: config.embedding_model.clone(),
            body_builder: google_body,
            parse: google_parse,
        }),
        "ollama" => Arc::new(HttpEmbeddingProvider {
            client: http_client(),
            url: config
                .vector_store_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434/api/embed".to_string()),
            api_key: String::new(),
            model: config.embedding_model.clone(),
            body_builder: ollama_body,
            parse: ollama_parse,
        }),
        _ => Arc::new(BaseEmbeddingProvider::new(config.embedding_dim)),
    }
}
