//! Provider catalogue: supported providers, their endpoints and known models.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// A supported model provider. All of them speak the OpenAI chat-completions format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    Deepseek,
    Openai,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Ollama,
        ProviderKind::Deepseek,
        ProviderKind::Openai,
    ];

    pub fn key(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::Deepseek => "deepseek",
            ProviderKind::Openai => "openai",
        }
    }

    /// Parse a provider key, rejecting anything outside the catalogue.
    pub fn parse(key: &str) -> Result<Self, ConfigError> {
        let normalized = key.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.key() == normalized)
            .ok_or_else(|| ConfigError::UnknownProvider {
                provider: key.to_string(),
                expected: Self::ALL.map(|p| p.key()).join(", "),
            })
    }

    /// Default chat-completions base URL.
    pub fn base_url(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "http://localhost:11434/v1",
            ProviderKind::Deepseek => "https://api.deepseek.com/v1",
            ProviderKind::Openai => "https://api.openai.com/v1",
        }
    }

    /// Environment variable conventionally holding the credential.
    pub fn api_key_env(self) -> &'static str {
        match self {
            ProviderKind::Ollama => "OLLAMA_API_KEY",
            ProviderKind::Deepseek => "DEEPSEEK_API_KEY",
            ProviderKind::Openai => "OPENAI_API_KEY",
        }
    }

    pub fn requires_api_key(self) -> bool {
        !matches!(self, ProviderKind::Ollama)
    }

    /// Models offered in selection lists; the first is the default.
    pub fn default_models(self) -> &'static [&'static str] {
        match self {
            ProviderKind::Ollama => &["llama3", "mistral", "llama2", "codellama", "phi"],
            ProviderKind::Deepseek => &["deepseek-chat", "deepseek-coder"],
            ProviderKind::Openai => &["gpt-3.5-turbo", "gpt-4o-mini", "gpt-4o", "gpt-4-turbo"],
        }
    }

    pub fn default_model(self) -> &'static str {
        self.default_models()[0]
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Metadata about a single LLM model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: ProviderKind,
    /// Context window size in tokens, if known.
    pub context_window: Option<usize>,
    /// Input cost per million tokens, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_cost_per_million: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_cost_per_million: Option<f64>,
}

/// Known models for a provider.
pub fn known_models(provider: ProviderKind) -> Vec<ModelInfo> {
    provider
        .default_models()
        .iter()
        .map(|id| {
            let pricing = model_pricing(id);
            ModelInfo {
                id: id.to_string(),
                provider,
                context_window: context_window(id),
                input_cost_per_million: pricing.map(|(i, _)| i),
                output_cost_per_million: pricing.map(|(_, o)| o),
            }
        })
        .collect()
}

/// Per-million (input, output) USD pricing for hosted models. Local models are free.
pub fn model_pricing(model: &str) -> Option<(f64, f64)> {
    match model {
        "gpt-3.5-turbo" => Some((0.50, 1.50)),
        "gpt-4o-mini" => Some((0.15, 0.60)),
        "gpt-4o" => Some((2.50, 10.0)),
        "gpt-4-turbo" => Some((10.0, 30.0)),
        "deepseek-chat" | "deepseek-coder" => Some((0.27, 1.10)),
        "llama3" | "mistral" | "llama2" | "codellama" | "phi" => Some((0.0, 0.0)),
        _ => None,
    }
}

fn context_window(model: &str) -> Option<usize> {
    match model {
        "gpt-3.5-turbo" => Some(16_385),
        "gpt-4o-mini" | "gpt-4o" | "gpt-4-turbo" => Some(128_000),
        "deepseek-chat" | "deepseek-coder" => Some(64_000),
        "llama3" => Some(8_192),
        "codellama" => Some(16_384),
        "mistral" | "llama2" | "phi" => Some(4_096),
        _ => None,
    }
}
