//! # Models
//!
//! LLM provider and model selection for the production generator.
//! Each generation task can run on its own model; anything not overridden
//! falls back to the global model.

use crate::generation::GenerationTask;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Supported LLM providers. API keys are read from the environment:
/// `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, `GEMINI_API_KEY`,
/// `OPENROUTER_API_KEY`, `XAI_API_KEY`, `DEEPSEEK_API_KEY`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
    Gemini,
    OpenRouter,
    Grok,
    DeepSeek,
}

impl LlmProvider {
    /// Parse a provider name as accepted on the command line
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Some(Self::Anthropic),
            "openai" | "gpt" => Some(Self::OpenAI),
            "gemini" | "google" => Some(Self::Gemini),
            "openrouter" => Some(Self::OpenRouter),
            "grok" | "xai" => Some(Self::Grok),
            "deepseek" => Some(Self::DeepSeek),
            _ => None,
        }
    }

    /// Model used when the configuration names none
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "claude-sonnet-4-20250514",
            LlmProvider::OpenAI => "gpt-4o",
            LlmProvider::Gemini => "gemini-2.5-pro",
            LlmProvider::OpenRouter => "anthropic/claude-3.5-sonnet",
            LlmProvider::Grok => "grok-2",
            LlmProvider::DeepSeek => "deepseek-chat",
        }
    }

    /// Whether this provider supports custom base URL
    pub fn supports_base_url(&self) -> bool {
        matches!(self, LlmProvider::OpenAI)
    }
}

/// Provider, model and optional endpoint for one generation task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    pub model: String,
    /// Base URL override for OpenAI-compatible APIs
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::for_provider(LlmProvider::default())
    }
}

impl ModelConfig {
    /// Provider with its default model
    pub fn for_provider(provider: LlmProvider) -> Self {
        Self {
            provider,
            model: provider.default_model().to_string(),
            base_url: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set base URL. Ignored by providers that do not support one.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        if self.provider.supports_base_url() {
            self.base_url = Some(url.into());
        }
        self
    }
}

/// Model selection across generation tasks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub global: ModelConfig,
    /// Per-task overrides
    #[serde(default)]
    pub per_task: HashMap<GenerationTask, ModelConfig>,
}

impl GeneratorConfig {
    pub fn new(global: ModelConfig) -> Self {
        Self {
            global,
            per_task: HashMap::new(),
        }
    }

    pub fn with_task_model(mut self, task: GenerationTask, config: ModelConfig) -> Self {
        self.per_task.insert(task, config);
        self
    }

    /// Per-task override, else the global model
    pub fn for_task(&self, task: GenerationTask) -> &ModelConfig {
        self.per_task.get(&task).unwrap_or(&self.global)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ModelConfig::default();
        assert_eq!(config.provider, LlmProvider::Anthropic);
        assert!(config.model.contains("claude"));
    }

    #[test]
    fn test_provider_names() {
        assert_eq!(LlmProvider::from_name("Gemini"), Some(LlmProvider::Gemini));
        assert_eq!(LlmProvider::from_name("xai"), Some(LlmProvider::Grok));
        assert_eq!(LlmProvider::from_name("mistral"), None);
    }

    #[test]
    fn test_base_url_only_for_openai() {
        let openai = ModelConfig::for_provider(LlmProvider::OpenAI).with_base_url("http://localhost:8000");
        assert_eq!(openai.base_url.as_deref(), Some("http://localhost:8000"));

        let anthropic = ModelConfig::default().with_base_url("http://localhost:8000");
        assert_eq!(anthropic.base_url, None);
    }

    #[test]
    fn test_task_override_falls_back_to_global() {
        let config = GeneratorConfig::new(ModelConfig::for_provider(LlmProvider::Gemini))
            .with_task_model(
                GenerationTask::LiteratureSearch,
                ModelConfig::for_provider(LlmProvider::Gemini).with_model("gemini-2.5-flash"),
            );

        assert_eq!(
            config.for_task(GenerationTask::LiteratureSearch).model,
            "gemini-2.5-flash"
        );
        assert_eq!(
            config.for_task(GenerationTask::PaperScoring).model,
            "gemini-2.5-pro"
        );
    }

    #[test]
    fn test_model_config_serialization() {
        let config = ModelConfig::for_provider(LlmProvider::OpenAI);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("openai"));
        assert!(json.contains("gpt-4o"));
    }
}
