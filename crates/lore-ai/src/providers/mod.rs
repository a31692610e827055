//! Chat-completion provider implementations

pub mod anthropic;
pub mod openai;

use crate::{CompletionOptions, Context, Error, Message, Model, Result};
use async_trait::async_trait;

/// Trait for chat-completion providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Request a single, complete assistant reply
    async fn complete(
        &self,
        model: &Model,
        context: &Context,
        options: &CompletionOptions,
    ) -> Result<Message>;
}

/// Build a header map from model-specific headers, skipping invalid entries.
pub(crate) fn extra_headers(model: &Model) -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    for (key, value) in &model.headers {
        if let (Ok(name), Ok(val)) = (
            key.parse::<reqwest::header::HeaderName>(),
            value.parse::<reqwest::header::HeaderValue>(),
        ) {
            headers.insert(name, val);
        }
    }
    headers
}

/// Read the body of a failed response and turn it into an error.
pub(crate) async fn error_from_response(response: reqwest::Response) -> Error {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    tracing::debug!("Provider returned {}: {}", status, text);
    Error::from_status(status, text)
}
