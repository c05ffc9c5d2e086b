//! YAML configuration surface for the episodic memory / LLM gateway core.
//!
//! The teacher's primary config format is JSON (`config/loader.rs`); this
//! module loads the core's three YAML files (`base.yaml`, `llm.yaml`,
//! `memory.yaml`) from the same root directory, using `serde_yaml_ng` (an
//! existing dependency). `music.yaml`/`update.yaml`/`prompt/<agent>.yaml` are
//! out of scope beyond the `get_system_prompt` interface (see `PromptStore`
//! below).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::utils::get_oxicrab_home;

/// Resolve the config root directory: `OXICRAB_CONFIG_DIR` env var, falling
/// back to the same home directory the JSON config loader uses.
pub fn config_root() -> PathBuf {
    std::env::var("OXICRAB_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| get_oxicrab_home().unwrap_or_else(|_| PathBuf::from(".")))
}

fn default_prefix() -> String {
    "!".to_string()
}

fn default_log_base() -> String {
    "logs".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingYaml {
    #[serde(default = "default_log_base")]
    pub base_dir: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default)]
    pub fsync_on_flush: bool,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// ANSI color per level for console rendering, e.g. `{"ERROR": "red"}`.
    #[serde(default)]
    pub color_map: HashMap<String, String>,
}

fn default_batch_size() -> usize {
    50
}
fn default_flush_interval_ms() -> u64 {
    1000
}
fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingYaml {
    fn default() -> Self {
        Self {
            base_dir: default_log_base(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            fsync_on_flush: false,
            retention_days: default_retention_days(),
            color_map: HashMap::new(),
        }
    }
}

/// `base.yaml`: prefix, activity, version, logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub activity: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub logging: LoggingYaml,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            activity: String::new(),
            version: String::new(),
            logging: LoggingYaml::default(),
        }
    }
}

/// One entry in a provider priority list: provider name → candidate models,
/// tried in order until one succeeds.
pub type ProviderModels = HashMap<String, Vec<String>>;

/// `llm.yaml`: `model_priorities: { <agent_type>: [ { <provider>: [<model>...] }, ... ] }`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub model_priorities: HashMap<String, Vec<ProviderModels>>,
}

impl LlmConfig {
    /// Flatten the priority list for `agent_type` into an ordered list of
    /// `(provider, model)` candidates, in declaration order.
    pub fn priority_list(&self, agent_type: &str) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Some(groups) = self.model_priorities.get(agent_type) {
            for group in groups {
                for (provider, models) in group {
                    for model in models {
                        out.push((provider.clone(), model.clone()));
                    }
                }
            }
        }
        out
    }
}

fn default_message_threshold() -> u32 {
    30
}
fn default_vector_search_k() -> usize {
    5
}
fn default_keyword_search_k() -> usize {
    5
}
fn default_embedding_dim() -> usize {
    384
}
fn default_etl_cadence_secs() -> u64 {
    10
}

/// `memory.yaml`: toggles, storage paths, vector store kind/URL, embedding
/// provider/model/dim, per-channel thresholds, search fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryYamlConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    #[serde(default = "default_vector_store_kind")]
    pub vector_store_kind: String,
    #[serde(default)]
    pub vector_store_url: Option<String>,
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,
    #[serde(default = "default_message_threshold")]
    pub message_threshold: u32,
    #[serde(default = "default_vector_search_k")]
    pub vector_search_k: usize,
    #[serde(default = "default_keyword_search_k")]
    pub keyword_search_k: usize,
    #[serde(default = "default_etl_cadence_secs")]
    pub etl_cadence_secs: u64,
    /// "archive" (default) or "delete" — see DESIGN.md open-question decision.
    #[serde(default = "default_retention_policy")]
    pub retention_policy: String,
}

fn default_true() -> bool {
    true
}
fn default_storage_path() -> String {
    "memory.sqlite3".to_string()
}
fn default_vector_store_kind() -> String {
    "sqlite".to_string()
}
fn default_embedding_provider() -> String {
    "base".to_string()
}
fn default_embedding_model() -> String {
    "bge-small-en-v1.5".to_string()
}
fn default_retention_policy() -> String {
    "archive".to_string()
}

impl Default for MemoryYamlConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage_path: default_storage_path(),
            vector_store_kind: default_vector_store_kind(),
            vector_store_url: None,
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            embedding_dim: default_embedding_dim(),
            message_threshold: default_message_threshold(),
            vector_search_k: default_vector_search_k(),
            keyword_search_k: default_keyword_search_k(),
            etl_cadence_secs: default_etl_cadence_secs(),
            retention_policy: default_retention_policy(),
        }
    }
}

impl MemoryYamlConfig {
    pub fn archive_on_vectorize(&self) -> bool {
        self.retention_policy != "delete"
    }
}

fn load_yaml<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml_ng::from_str(&content)
        .with_context(|| format!("failed to parse YAML from {}", path.display()))
}

pub fn load_base_config(root: &Path) -> Result<BaseConfig> {
    load_yaml(&root.join("base.yaml"))
}

pub fn load_llm_config(root: &Path) -> Result<LlmConfig> {
    load_yaml(&root.join("llm.yaml"))
}

pub fn load_memory_config(root: &Path) -> Result<MemoryYamlConfig> {
    load_yaml(&root.join("memory.yaml"))
}

/// Loads `prompt/<agent>.yaml` and exposes the composed system prompt via
/// `get_system_prompt`. Composition logic (includes, variable substitution)
/// is out of scope; this reads one `system_prompt` string field per file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PromptFile {
    #[serde(default)]
    system_prompt: String,
}

pub struct PromptStore {
    root: PathBuf,
}

impl PromptStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn get_system_prompt(&self, agent: &str) -> Result<String> {
        let path = self.root.join("prompt").join(format!("{agent}.yaml"));
        if !path.exists() {
            return Ok(String::new());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let parsed: PromptFile = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("failed to parse prompt YAML from {}", path.display()))?;
        Ok(parsed.system_prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_list_flattens_in_declaration_order() {
        let yaml = r#"
model_priorities:
  planner:
    - google: ["gemini-pro"]
    - openai: ["gpt-4o", "gpt-4o-mini"]
"#;
        let cfg: LlmConfig = serde_yaml_ng::from_str(yaml).unwrap();
        let list = cfg.priority_list("planner");
        assert_eq!(
            list,
            vec![
                ("google".to_string(), "gemini-pro".to_string()),
                ("openai".to_string(), "gpt-4o".to_string()),
                ("openai".to_string(), "gpt-4o-mini".to_string()),
            ]
        );
    }

    #[test]
    fn missing_agent_type_yields_empty_list() {
        let cfg = LlmConfig::default();
        assert!(cfg.priority_list("nonexistent").is_empty());
    }

    #[test]
    fn memory_config_defaults_archive() {
        let cfg = MemoryYamlConfig::default();
        assert!(cfg.archive_on_vectorize());
    }

    #[test]
    fn missing_yaml_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_memory_config(dir.path()).unwrap();
        assert_eq!(cfg.message_threshold, 30);
    }
}
