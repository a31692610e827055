//! Text embedding clients.
//!
//! Queries are embedded with the same model that populated the document
//! index; mixing models silently produces meaningless distances.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{Error, Provider, Result};

/// Retries on 429/5xx/network errors before giving up
const MAX_RETRIES: u32 = 3;

/// Produces embedding vectors for text
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier used for embeddings
    fn model_name(&self) -> &str;

    /// Embed a batch of texts, returning one vector per input in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::UnexpectedResponse("embedding response was empty".into()))
    }
}

/// Client for any OpenAI-compatible `/embeddings` endpoint (OpenAI, Ollama, Azure)
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    provider: Provider,
    api_key: Option<String>,
}

impl OpenAIEmbedder {
    /// Create a new embedder
    pub fn new(
        provider: Provider,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            provider,
            api_key,
        })
    }

    async fn send_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut builder = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&body);

        if self.provider == Provider::Azure {
            builder = builder.query(&[(
                "api-version",
                crate::providers::openai::AZURE_API_VERSION,
            )]);
            if let Some(ref key) = self.api_key {
                builder = builder.header("api-key", key);
            }
        } else if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status, text));
        }

        let parsed: EmbeddingResponse = response.json().await?;
        parse_embeddings(parsed, texts.len())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0u32;
        loop {
            match self.send_once(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                    // Exponential backoff: 1s, 2s, 4s, ...
                    let delay = Duration::from_secs(1 << attempt.min(5));
                    tracing::warn!(
                        "Embedding request failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt + 1,
                        MAX_RETRIES + 1,
                        e,
                        delay
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Order embeddings by their `index` field and check the count matches the input.
fn parse_embeddings(mut response: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    if response.data.len() != expected {
        return Err(Error::UnexpectedResponse(format!(
            "expected {} embeddings, got {}",
            expected,
            response.data.len()
        )));
    }
    response.data.sort_by_key(|item| item.index);
    Ok(response.data.into_iter().map(|item| item.embedding).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_embeddings_sorts_by_index() {
        let response: EmbeddingResponse = serde_json::from_value(serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        }))
        .unwrap();

        let vectors = parse_embeddings(response, 2).unwrap();
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_parse_embeddings_count_mismatch() {
        let response: EmbeddingResponse = serde_json::from_value(serde_json::json!({
            "data": [{ "index": 0, "embedding": [1.0] }]
        }))
        .unwrap();
        assert!(parse_embeddings(response, 3).is_err());
    }

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    #[tokio::test]
    async fn test_embed_query_default_impl() {
        let v = FixedEmbedder.embed_query("four").await.unwrap();
        assert_eq!(v, vec![4.0]);
    }
}
