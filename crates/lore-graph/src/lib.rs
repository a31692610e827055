//! lore-graph: retrieval-augmented conversation pipeline
//!
//! A user turn runs through a fixed two-stage pipeline, retrieve then
//! generate, over a [`ConversationState`] that is checkpointed per thread so
//! multi-turn conversations keep their history.

pub mod checkpoint;
pub mod error;
pub mod events;
pub mod generator;
pub mod index;
pub mod llm;
pub mod pipeline;
pub mod retriever;
pub mod state;
pub mod thread;

pub use checkpoint::{Checkpoint, Checkpointer, MemoryCheckpointer};
pub use error::{Error, Result};
pub use events::{Stage, StageUpdate};
pub use generator::{Generator, GeneratorConfig, NO_CONTEXT_MARKER};
pub use index::{ChromaConfig, ChromaIndex, Document, DocumentIndex};
pub use llm::{LanguageModel, ProviderModel, RetryConfig};
pub use pipeline::{Pipeline, PipelineConfig, StageStream};
pub use retriever::{Retriever, RetrieverConfig};
pub use state::{ConversationState, StateUpdate};
pub use thread::ThreadId;
