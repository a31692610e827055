//! Configuration file support

use lore_ai::Provider;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Configuration for lore
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat model provider (openai, anthropic, azure, ollama, groq, openrouter)
    pub provider: Option<String>,
    /// Chat model id
    pub model: Option<String>,
    /// Override the provider's default endpoint
    pub base_url: Option<String>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Output token cap per reply
    pub max_tokens: Option<u32>,
    /// Contact offered when the knowledge base has no answer
    pub support_contact: Option<String>,
    /// API keys (alternative to environment variables)
    #[serde(default)]
    pub api_keys: ApiKeys,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
}

/// API key configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub azure: Option<String>,
    pub groq: Option<String>,
    pub openrouter: Option<String>,
}

/// Document index settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub chroma_url: Option<String>,
    pub tenant: Option<String>,
    pub database: Option<String>,
    pub collection: Option<String>,
    /// Fragments retrieved per turn
    pub top_k: Option<usize>,
}

/// Query embedding settings; must match how the collection was built
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lore")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("LORE_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            provider: Some("openai".to_string()),
            model: Some("gpt-4o-mini".to_string()),
            temperature: Some(0.7),
            support_contact: Some("support@example.com".to_string()),
            retrieval: RetrievalSettings {
                chroma_url: Some("http://localhost:8000".to_string()),
                collection: Some("documents".to_string()),
                top_k: Some(5),
                ..Default::default()
            },
            embedding: EmbeddingSettings {
                provider: Some("openai".to_string()),
                model: Some("text-embedding-3-small".to_string()),
                base_url: None,
            },
            ..Default::default()
        };

        default_config.save()?;
        Ok(path)
    }

    /// Get API key for a provider, checking config then env
    pub fn get_api_key(&self, provider: Provider) -> Option<String> {
        let from_config = match provider {
            Provider::OpenAI => self.api_keys.openai.clone(),
            Provider::Anthropic => self.api_keys.anthropic.clone(),
            Provider::Azure => self.api_keys.azure.clone(),
            Provider::Groq => self.api_keys.groq.clone(),
            Provider::OpenRouter => self.api_keys.openrouter.clone(),
            Provider::Ollama | Provider::Custom => None,
        };

        if from_config.is_some() {
            return from_config;
        }

        provider
            .api_key_env_var()
            .and_then(|var| std::env::var(var).ok())
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# lore configuration file
# Place at ~/.config/lore/config.toml (Linux/Mac) or %APPDATA%\lore\config.toml (Windows)

# Chat model provider (openai, anthropic, azure, ollama, groq, openrouter)
provider = "openai"
model = "gpt-4o-mini"

# Required for azure: https://<resource>.openai.azure.com/openai/deployments/<deployment>
# base_url = "..."

temperature = 0.7
# max_tokens = 1024

# Where users are pointed when the knowledge base has no answer
support_contact = "support@example.com"

[retrieval]
chroma_url = "http://localhost:8000"
collection = "documents"
top_k = 5

# Must match the model the collection was embedded with
[embedding]
provider = "openai"
model = "text-embedding-3-small"

# API keys (optional - can also use environment variables)
[api_keys]
# openai = "sk-..."
# anthropic = "sk-ant-..."
"#
}
