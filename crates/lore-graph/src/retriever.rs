//! Retrieval stage: fetch context for the latest user utterance.

use std::sync::Arc;

use crate::{
    index::DocumentIndex,
    state::{ConversationState, StateUpdate},
};

/// Number of fragments requested per turn
pub const DEFAULT_TOP_K: usize = 5;

/// Retriever configuration
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Maximum fragments to keep per turn
    pub top_k: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Queries the document index with the most recent user message.
///
/// Retrieval is best-effort: any index failure degrades to an empty context
/// so the turn can still be answered.
pub struct Retriever {
    index: Arc<dyn DocumentIndex>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(index: Arc<dyn DocumentIndex>, config: RetrieverConfig) -> Self {
        Self { index, config }
    }

    /// Produce a context replacement for `state`. Never fails.
    pub async fn retrieve(&self, state: &ConversationState) -> StateUpdate {
        let Some(query) = state.last_user_message().map(|m| m.text()) else {
            tracing::warn!("No user message in state, skipping retrieval");
            return StateUpdate::context(vec![]);
        };

        tracing::info!("Querying document index for: {}", query);

        match self.index.similarity_search(query, self.config.top_k).await {
            Ok(documents) => {
                let context: Vec<String> = documents
                    .into_iter()
                    .take(self.config.top_k)
                    .map(|d| d.content)
                    .collect();
                tracing::info!("Retrieved {} documents", context.len());
                StateUpdate::context(context)
            }
            Err(e) => {
                tracing::warn!("Retrieval failed, continuing without context: {}", e);
                StateUpdate::context(vec![])
            }
        }
    }
}
