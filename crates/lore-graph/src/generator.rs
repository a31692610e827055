//! Generation stage: grounded reply from history plus retrieved context.

use std::sync::Arc;

use lore_ai::{AssistantMetadata, Context, Message, StopReason};

use crate::{
    llm::LanguageModel,
    state::{ConversationState, StateUpdate},
};

/// Substituted for the context block when retrieval found nothing.
pub const NO_CONTEXT_MARKER: &str = "No relevant information found.";

/// Reply used when the model call fails.
pub const ERROR_REPLY: &str =
    "I apologize, but I encountered an error while processing your request.";

/// Generator configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Opening line establishing who the assistant is
    pub persona: String,
    /// Where users are sent when the context has no answer
    pub support_contact: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            persona: "You are a helpful customer support assistant.".to_string(),
            support_contact: "support@example.com".to_string(),
        }
    }
}

/// Build the instruction for one turn from the retrieved fragments.
///
/// Fragments are joined with a blank line. An empty context yields
/// [`NO_CONTEXT_MARKER`] in its place, never an empty block.
pub fn build_system_prompt(config: &GeneratorConfig, context: &[String]) -> String {
    let context_block = if context.is_empty() {
        NO_CONTEXT_MARKER.to_string()
    } else {
        context.join("\n\n")
    };

    format!(
        "{persona}\n\
         Use the following context to answer the user's question.\n\
         If the answer is not in the context, politely say that you don't have the answer \
         and suggest contacting human support at {contact}.\n\
         Keep your answers concise and helpful.\n\
         \n\
         Context:\n\
         {context_block}\n",
        persona = config.persona,
        contact = config.support_contact,
        context_block = context_block,
    )
}

/// Calls the language model once per turn and appends exactly one assistant message.
pub struct Generator {
    model: Arc<dyn LanguageModel>,
    config: GeneratorConfig,
}

impl Generator {
    pub fn new(model: Arc<dyn LanguageModel>, config: GeneratorConfig) -> Self {
        Self { model, config }
    }

    /// Assemble what is sent to the model. The instruction is rebuilt every
    /// turn and never enters the stored history.
    pub fn build_context(&self, state: &ConversationState) -> Context {
        Context {
            system_prompt: Some(build_system_prompt(&self.config, &state.context)),
            messages: state.messages.clone(),
        }
    }

    /// Produce the assistant reply for `state`. Never fails: model errors
    /// become an apologetic assistant message.
    pub async fn generate(&self, state: &ConversationState) -> StateUpdate {
        let context = self.build_context(state);

        tracing::debug!(
            "Generating with {} ({} history messages, {} context fragments)",
            self.model.model_id(),
            context.messages.len(),
            state.context.len()
        );

        let reply = match self.model.invoke(&context).await {
            Ok(message) => match message {
                Message::Assistant { .. } => {
                    tracing::info!("Response generated");
                    message
                }
                other => {
                    tracing::error!(
                        "Model returned a {} message instead of an assistant reply",
                        other.role().as_str()
                    );
                    error_reply(format!("unexpected {} message", other.role().as_str()))
                }
            },
            Err(e) => {
                tracing::error!("Generation failed: {}", e);
                error_reply(e.to_string())
            }
        };

        StateUpdate::messages(vec![reply])
    }
}

fn error_reply(detail: String) -> Message {
    Message::Assistant {
        content: ERROR_REPLY.to_string(),
        metadata: AssistantMetadata {
            stop_reason: Some(StopReason::Error),
            error_message: Some(detail),
            timestamp: chrono::Utc::now().timestamp_millis(),
            ..Default::default()
        },
    }
}
