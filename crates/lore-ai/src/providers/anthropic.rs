//! Anthropic Messages API provider

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{LlmProvider, error_from_response, extra_headers};
use crate::{
    error::{Error, Result},
    types::{
        AssistantMetadata, CompletionOptions, Context, Message, Model, StopReason, Usage,
    },
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic API client
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    fn build_request(
        &self,
        model: &Model,
        context: &Context,
        options: &CompletionOptions,
    ) -> MessagesRequest {
        // Anthropic has no system role inside `messages`; fold any into the
        // top-level system field after the main instruction.
        let mut system_parts: Vec<String> = context.system_prompt.iter().cloned().collect();
        let mut messages = Vec::with_capacity(context.messages.len());

        for msg in &context.messages {
            match msg {
                Message::System { content, .. } => system_parts.push(content.clone()),
                Message::User { content, .. } => messages.push(WireMessage {
                    role: "user",
                    content: content.clone(),
                }),
                Message::Assistant { content, .. } => messages.push(WireMessage {
                    role: "assistant",
                    content: content.clone(),
                }),
            }
        }

        MessagesRequest {
            model: model.id.clone(),
            max_tokens: options.max_tokens.unwrap_or(model.max_tokens),
            system: if system_parts.is_empty() {
                None
            } else {
                Some(system_parts.join("\n\n"))
            },
            messages,
            temperature: options.temperature,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        model: &Model,
        context: &Context,
        options: &CompletionOptions,
    ) -> Result<Message> {
        let request = self.build_request(model, context, options);
        let url = format!("{}/v1/messages", model.base_url);

        tracing::debug!("Anthropic API URL: {}", url);

        let response = self
            .client
            .post(&url)
            .headers(extra_headers(model))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body: MessagesResponse = response.json().await?;
        parse_response(body, model)
    }
}

fn parse_response(body: MessagesResponse, model: &Model) -> Result<Message> {
    let text: String = body
        .content
        .iter()
        .filter(|block| block.block_type == "text")
        .filter_map(|block| block.text.as_deref())
        .collect();

    if text.is_empty() {
        return Err(Error::UnexpectedResponse(
            "response contained no text blocks".into(),
        ));
    }

    let stop_reason = match body.stop_reason.as_deref() {
        Some("end_turn") | Some("stop_sequence") => Some(StopReason::Stop),
        Some("max_tokens") => Some(StopReason::Length),
        _ => None,
    };

    Ok(Message::Assistant {
        content: text,
        metadata: AssistantMetadata {
            provider: Some(model.provider),
            model: Some(body.model.unwrap_or_else(|| model.id.clone())),
            usage: Usage {
                input: body.usage.input_tokens,
                output: body.usage.output_tokens,
            },
            stop_reason,
            error_message: None,
            timestamp: chrono::Utc::now().timestamp_millis(),
        },
    })
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: ResponseUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Provider, models::resolve_model};

    fn test_model() -> Model {
        resolve_model(Provider::Anthropic, "claude-3-5-haiku-latest", None).unwrap()
    }

    #[test]
    fn test_system_prompt_is_top_level() {
        let provider = AnthropicProvider::new("test-key");
        let context = Context {
            system_prompt: Some("You are a support assistant.".to_string()),
            messages: vec![Message::user("Where is my order?")],
        };

        let request =
            provider.build_request(&test_model(), &context, &CompletionOptions::default());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["system"], "You are a support assistant.");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_parse_response_joins_text_blocks() {
        let body: MessagesResponse = serde_json::from_value(serde_json::json!({
            "model": "claude-3-5-haiku-20241022",
            "content": [
                { "type": "text", "text": "Orders ship " },
                { "type": "text", "text": "within 2 days." }
            ],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 40, "output_tokens": 8 }
        }))
        .unwrap();

        let msg = parse_response(body, &test_model()).unwrap();
        assert_eq!(msg.text(), "Orders ship within 2 days.");
    }

    #[test]
    fn test_parse_response_without_text_fails() {
        let body: MessagesResponse =
            serde_json::from_value(serde_json::json!({ "content": [], "stop_reason": "end_turn" }))
                .unwrap();
        assert!(matches!(
            parse_response(body, &test_model()),
            Err(Error::UnexpectedResponse(_))
        ));
    }
}
