//! Model construction from a provider/model pair.

use std::collections::HashMap;

use crate::{Error, Model, Provider, Result};

/// Default output token cap for models resolved without an explicit limit.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Build a [`Model`] for `provider` and `id`.
///
/// `base_url` overrides the provider default. Azure and custom providers have
/// no default endpoint, so they require one.
pub fn resolve_model(provider: Provider, id: &str, base_url: Option<&str>) -> Result<Model> {
    let base_url = match base_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => provider.default_base_url().to_string(),
    };

    if base_url.is_empty() {
        return Err(Error::InvalidConfig(format!(
            "provider {} requires an explicit base_url",
            provider.name()
        )));
    }

    Ok(Model {
        id: id.to_string(),
        name: id.to_string(),
        api: provider.api(),
        provider,
        base_url,
        max_tokens: DEFAULT_MAX_TOKENS,
        headers: HashMap::new(),
    })
}

/// Default model id for each provider.
pub fn default_model_id(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAI | Provider::Azure => "gpt-4o-mini",
        Provider::Anthropic => "claude-3-5-haiku-latest",
        Provider::Groq => "llama-3.1-8b-instant",
        Provider::OpenRouter => "openai/gpt-4o-mini",
        Provider::Ollama | Provider::Custom => "llama3.1",
    }
}
