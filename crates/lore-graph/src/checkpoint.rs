//! Per-thread conversation checkpoints.
//!
//! [`MemoryCheckpointer`] lives as long as the process and never evicts.
//! Concurrent turns on the same thread are not ordered here: both read the
//! same snapshot and the later `save` wins.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::{error::Result, state::ConversationState, thread::ThreadId};

/// The persisted snapshot for one thread
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub state: ConversationState,
    /// Number of saves since the thread was created
    pub turns: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    fn empty() -> Self {
        let now = Utc::now();
        Self {
            state: ConversationState::default(),
            turns: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Storage for conversation checkpoints keyed by thread id
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Load the state for `thread_id`, creating an empty checkpoint if none exists
    async fn get_or_create(&self, thread_id: &ThreadId) -> Result<ConversationState>;

    /// Replace the state stored for `thread_id`
    async fn save(&self, thread_id: &ThreadId, state: &ConversationState) -> Result<()>;

    /// Read a checkpoint without creating one
    async fn get(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>>;
}

/// Volatile, unbounded in-memory checkpoint store
#[derive(Default)]
pub struct MemoryCheckpointer {
    checkpoints: Mutex<HashMap<ThreadId, Checkpoint>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of threads currently held
    pub fn len(&self) -> usize {
        self.checkpoints.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.lock().is_empty()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn get_or_create(&self, thread_id: &ThreadId) -> Result<ConversationState> {
        let mut checkpoints = self.checkpoints.lock();
        let checkpoint = checkpoints.entry(thread_id.clone()).or_insert_with(|| {
            tracing::debug!("Creating checkpoint for thread {}", thread_id);
            Checkpoint::empty()
        });
        Ok(checkpoint.state.clone())
    }

    async fn save(&self, thread_id: &ThreadId, state: &ConversationState) -> Result<()> {
        let mut checkpoints = self.checkpoints.lock();
        let checkpoint = checkpoints
            .entry(thread_id.clone())
            .or_insert_with(Checkpoint::empty);
        checkpoint.state = state.clone();
        checkpoint.turns += 1;
        checkpoint.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, thread_id: &ThreadId) -> Result<Option<Checkpoint>> {
        Ok(self.checkpoints.lock().get(thread_id).cloned())
    }
}
