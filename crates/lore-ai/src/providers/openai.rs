//! OpenAI-compatible Chat Completions provider
//!
//! Covers OpenAI itself plus every endpoint speaking the same protocol:
//! Azure OpenAI deployments, Ollama, Groq and OpenRouter.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{LlmProvider, error_from_response, extra_headers};
use crate::{
    error::{Error, Result},
    types::{
        AssistantMetadata, CompletionOptions, Context, Message, Model, Provider, StopReason,
        Usage,
    },
};

/// `api-version` query parameter sent to Azure deployments.
pub const AZURE_API_VERSION: &str = "2024-06-01";

/// OpenAI-compatible API client
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl OpenAIProvider {
    /// Create a new provider with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: Some(api_key.into()),
        }
    }

    /// Create a provider for keyless local endpoints such as Ollama
    pub fn without_key() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: None,
        }
    }

    fn build_request(
        &self,
        model: &Model,
        context: &Context,
        options: &CompletionOptions,
    ) -> ChatRequest {
        let mut messages = Vec::with_capacity(context.messages.len() + 1);

        // The instruction always goes first
        if let Some(ref system_prompt) = context.system_prompt {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system_prompt.clone(),
            });
        }

        for msg in &context.messages {
            messages.push(ChatMessage {
                role: msg.role().as_str().to_string(),
                content: msg.text().to_string(),
            });
        }

        ChatRequest {
            model: model.id.clone(),
            messages,
            stream: false,
            max_tokens: Some(options.max_tokens.unwrap_or(model.max_tokens)),
            temperature: options.temperature,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn complete(
        &self,
        model: &Model,
        context: &Context,
        options: &CompletionOptions,
    ) -> Result<Message> {
        let request = self.build_request(model, context, options);
        let url = format!("{}/chat/completions", model.base_url);

        tracing::debug!("Chat completion request to {} ({} messages)", url, request.messages.len());

        let mut builder = self
            .client
            .post(&url)
            .headers(extra_headers(model))
            .json(&request);

        if model.provider == Provider::Azure {
            builder = builder.query(&[("api-version", AZURE_API_VERSION)]);
            if let Some(ref key) = self.api_key {
                builder = builder.header("api-key", key);
            }
        } else if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: ChatResponse = response.json().await?;
        parse_response(body, model)
    }
}

fn parse_response(body: ChatResponse, model: &Model) -> Result<Message> {
    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| Error::UnexpectedResponse("response contained no choices".into()))?;

    let content = choice
        .message
        .content
        .ok_or_else(|| Error::UnexpectedResponse("choice contained no content".into()))?;

    let stop_reason = match choice.finish_reason.as_deref() {
        Some("stop") => Some(StopReason::Stop),
        Some("length") => Some(StopReason::Length),
        _ => None,
    };

    let usage = body
        .usage
        .map(|u| Usage {
            input: u.prompt_tokens,
            output: u.completion_tokens,
        })
        .unwrap_or_default();

    Ok(Message::Assistant {
        content,
        metadata: AssistantMetadata {
            provider: Some(model.provider),
            model: Some(body.model.unwrap_or_else(|| model.id.clone())),
            usage,
            stop_reason,
            error_message: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        },
    })
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resolve_model;

    fn test_model() -> Model {
        resolve_model(Provider::Ollama, "llama3.1", None).unwrap()
    }

    #[test]
    fn test_build_request_puts_system_prompt_first() {
        let provider = OpenAIProvider::without_key();
        let context = Context {
            system_prompt: Some("be brief".to_string()),
            messages: vec![
                Message::user("hi"),
                Message::assistant("hello"),
                Message::user("what now?"),
            ],
        };

        let options = CompletionOptions {
            temperature: Some(0.7),
            max_tokens: None,
        };
        let request = provider.build_request(&test_model(), &context, &options);
        let json = serde_json::to_value(&request).unwrap();

        let roles: Vec<&str> = json["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(json["messages"][0]["content"], "be brief");
        assert_eq!(json["stream"], false);
        assert_eq!(json["max_tokens"], crate::models::DEFAULT_MAX_TOKENS);
        assert!((json["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_parse_response_extracts_content_and_usage() {
        let body: ChatResponse = serde_json::from_value(serde_json::json!({
            "model": "llama3.1:8b",
            "choices": [{
                "message": { "role": "assistant", "content": "We open at 9." },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 120, "completion_tokens": 6 }
        }))
        .unwrap();

        let msg = parse_response(body, &test_model()).unwrap();
        assert_eq!(msg.text(), "We open at 9.");
        match msg {
            Message::Assistant { metadata, .. } => {
                assert_eq!(metadata.model.as_deref(), Some("llama3.1:8b"));
                assert_eq!(metadata.usage.input, 120);
                assert_eq!(metadata.stop_reason, Some(StopReason::Stop));
            }
            other => panic!("expected assistant message, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_response_without_choices_is_unexpected() {
        let body: ChatResponse =
            serde_json::from_value(serde_json::json!({ "choices": [] })).unwrap();
        let err = parse_response(body, &test_model()).unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[test]
    fn test_parse_response_null_content_is_unexpected() {
        let body: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{ "message": { "content": null }, "finish_reason": "stop" }]
        }))
        .unwrap();
        assert!(parse_response(body, &test_model()).is_err());
    }
}
