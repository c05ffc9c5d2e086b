pub mod credentials;
pub mod loader;
pub mod schema;
pub mod yaml_loader;

pub use loader::{get_config_path, load_config, save_config};
pub use yaml_loader::{
    BaseConfig, LlmConfig, MemoryYamlConfig, PromptStore, config_root, load_base_config,
    load_llm_config, load_memory_config,
};
pub use schema::{
    A2aConfig, AgentDefaults, AgentsConfig, AnthropicOAuthConfig, BrowserConfig, ChannelsConfig,
    CheckpointConfig, CircuitBreakerConfig, CognitiveConfig, CompactionConfig, Config,
    ContextProviderConfig, CostGuardConfig, CredentialHelperConfig, DiscordCommand,
    DiscordCommandOption, DiscordConfig, DmPolicy, ExecToolConfig, ExfiltrationGuardConfig,
    FusionStrategy, GatewayConfig, GitHubConfig, GoogleConfig, ImageGenConfig, McpConfig,
    MediaConfig, MemoryConfig, ModelCost, ObsidianConfig, PromptGuardAction, PromptGuardConfig,
    ProviderConfig, ProvidersConfig, SandboxConfig, SlackConfig, TelegramConfig, TodoistConfig,
    ToolsConfig, TranscriptionConfig, TwilioConfig, VoiceConfig, WeatherConfig, WebSearchConfig,
    WebhookConfig, WebhookTarget, WhatsAppConfig, normalize_provider,
};
