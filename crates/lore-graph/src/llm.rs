//! Language-model seam used by the generation stage

use std::time::Duration;

use async_trait::async_trait;
use lore_ai::{
    Api, CompletionOptions, Context, Error, Message, Model, Result,
    providers::{LlmProvider, anthropic::AnthropicProvider, openai::OpenAIProvider},
};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// A model that turns an instruction plus history into one reply
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Single blocking completion; no partial output
    async fn invoke(&self, context: &Context) -> Result<Message>;

    /// Model identifier, for logging
    fn model_id(&self) -> &str;
}

/// [`LanguageModel`] backed by a real provider, with retry on transient errors
pub struct ProviderModel {
    model: Model,
    provider: Box<dyn LlmProvider>,
    options: CompletionOptions,
    retry: RetryConfig,
}

impl ProviderModel {
    /// Pick the provider implementation matching `model.api`.
    ///
    /// Anthropic always needs a key; OpenAI-compatible endpoints such as
    /// Ollama may run without one.
    pub fn new(
        model: Model,
        api_key: Option<String>,
        options: CompletionOptions,
    ) -> Result<Self> {
        let provider: Box<dyn LlmProvider> = match model.api {
            Api::AnthropicMessages => match api_key {
                Some(key) if !key.is_empty() => Box::new(AnthropicProvider::new(key)),
                _ => return Err(Error::InvalidApiKey),
            },
            Api::OpenAICompletions => match api_key {
                Some(key) => Box::new(OpenAIProvider::new(key)),
                None => Box::new(OpenAIProvider::without_key()),
            },
        };
        Ok(Self::with_provider(model, provider, options))
    }

    /// Use an explicit provider implementation
    pub fn with_provider(
        model: Model,
        provider: Box<dyn LlmProvider>,
        options: CompletionOptions,
    ) -> Self {
        Self {
            model,
            provider,
            options,
            retry: RetryConfig::default(),
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }
}

#[async_trait]
impl LanguageModel for ProviderModel {
    async fn invoke(&self, context: &Context) -> Result<Message> {
        let mut attempt = 0u32;
        loop {
            match self.provider.complete(&self.model, context, &self.options).await {
                Ok(message) => return Ok(message),
                Err(e) => {
                    // Context overflow is never retryable
                    if e.is_context_overflow() || !e.is_retryable() {
                        return Err(e);
                    }
                    if attempt >= self.retry.max_retries {
                        return Err(e);
                    }

                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt + 1,
                        self.retry.max_retries + 1,
                        e,
                        delay
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn model_id(&self) -> &str {
        &self.model.id
    }
}
