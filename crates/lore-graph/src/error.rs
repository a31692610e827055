//! Error types for lore-graph

use thiserror::Error;

/// Result type alias using lore-graph Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the provider layer (models, embeddings)
    #[error(transparent)]
    Ai(#[from] lore_ai::Error),

    /// The document index could not be reached or queried
    #[error("Index error: {0}")]
    Index(String),

    /// The checkpoint store failed; this aborts the turn
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// A generic pipeline error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error aborts a turn rather than degrading it
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Checkpoint(_) | Error::Other(_))
    }
}
