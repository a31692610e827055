//! lore-ai: chat-completion and embedding provider layer
//!
//! This crate provides a common interface for requesting single, complete
//! replies from OpenAI-compatible endpoints (OpenAI, Azure, Ollama, Groq,
//! OpenRouter) and Anthropic, plus an OpenAI-compatible embeddings client.

pub mod embeddings;
pub mod error;
pub mod models;
pub mod providers;
pub mod types;

pub use embeddings::{Embedder, OpenAIEmbedder};
pub use error::{Error, Result};
pub use providers::LlmProvider;
pub use types::*;
