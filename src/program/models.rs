use crate::config::Configuration;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

pub static OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// A model provider is the service that hosts the configured model.
/// It is derived from the configuration: local mode always talks to Ollama,
/// hosted mode talks to OpenAI unless a custom base URL is configured, in which
/// case any OpenAI compatible endpoint is used.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum ModelProvider {
    #[serde(rename = "ollama")]
    Ollama,
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "compatible")]
    Compatible,
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // guaranteed not to fail because this is enum to string serialization
        let self_str = serde_json::to_string(&self).unwrap_or_default();

        // remove quotes from JSON
        write!(f, "{}", self_str.trim_matches('"'))
    }
}

/// Handle to the chat model every agent of a crew reasons with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub name: String,
    pub provider: ModelProvider,
    pub base_url: String,
}

impl Model {
    pub fn new(
        name: impl Into<String>,
        provider: ModelProvider,
        base_url: impl Into<String>,
    ) -> Self {
        Model {
            name: name.into(),
            provider,
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &Configuration) -> Self {
        let base_url = config.model_base_url.trim().trim_end_matches('/').to_string();
        let provider = if config.local {
            ModelProvider::Ollama
        } else if base_url.is_empty() || base_url == OPENAI_BASE_URL {
            ModelProvider::OpenAI
        } else {
            ModelProvider::Compatible
        };
        Model::new(config.model_name.clone(), provider, base_url)
    }

    /// Host and port of the Ollama server, read from the base URL.
    /// `http://localhost:11434/v1` gives `("http://localhost", 11434)`.
    pub fn ollama_endpoint(&self) -> Option<(String, u16)> {
        let url = Url::parse(&self.base_url).ok()?;
        let host = url.host_str()?;
        let port = url.port_or_known_default()?;
        Some((format!("{}://{}", url.scheme(), host), port))
    }

    /// Llama family models emit tool calls in their own format.
    pub fn uses_llama_tool_format(&self) -> bool {
        self.name.to_lowercase().contains("llama")
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROVIDER_NAME: &str = "openai";

    fn config(local: bool, base_url: &str) -> Configuration {
        Configuration {
            local,
            model_base_url: base_url.to_string(),
            ..Configuration::default()
        }
    }

    #[test]
    fn test_provider_from_config() {
        let local = Model::from_config(&config(true, "http://localhost:11434/v1"));
        assert_eq!(local.provider, ModelProvider::Ollama);

        let hosted = Model::from_config(&config(false, ""));
        assert_eq!(hosted.provider, ModelProvider::OpenAI);

        let hosted = Model::from_config(&config(false, "https://api.openai.com/v1/"));
        assert_eq!(hosted.provider, ModelProvider::OpenAI);

        let custom = Model::from_config(&config(false, "https://openrouter.ai/api/v1"));
        assert_eq!(custom.provider, ModelProvider::Compatible);
        assert_eq!(custom.base_url, "https://openrouter.ai/api/v1");
    }

    #[test]
    fn test_ollama_endpoint() {
        let model = Model::new(
            "llama3:8b_crewai",
            ModelProvider::Ollama,
            "http://localhost:11434/v1",
        );
        assert_eq!(
            model.ollama_endpoint(),
            Some(("http://localhost".to_string(), 11434))
        );
        assert!(model.uses_llama_tool_format());

        let model = Model::new("phi3", ModelProvider::Ollama, "not a url");
        assert_eq!(model.ollama_endpoint(), None);
        assert!(!model.uses_llama_tool_format());
    }

    #[test]
    fn test_provider_string_serde() {
        let provider = ModelProvider::OpenAI;

        // serialize to string via serde
        let provider_str = serde_json::to_string(&provider).expect("should serialize");
        assert_eq!(provider_str, format!("\"{}\"", PROVIDER_NAME));

        // deserialize from string via serde
        let provider_from: ModelProvider =
            serde_json::from_str(&provider_str).expect("should deserialize");
        assert_eq!(provider_from, provider);

        assert_eq!(ModelProvider::Compatible.to_string(), "compatible");

        // (try) deserialize from invalid provider
        let bad_provider =
            serde_json::from_str::<ModelProvider>("\"this-provider-does-not-will-not-exist\"");
        assert!(bad_provider.is_err());
    }
}
