//! Pipeline orchestration: `START -> retrieve -> generate -> END`

use std::{collections::HashMap, pin::Pin, sync::Arc};

use async_stream::stream;
use lore_ai::Message;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_stream::Stream;

use crate::{
    checkpoint::Checkpointer,
    error::Result,
    events::{Stage, StageUpdate},
    generator::{Generator, GeneratorConfig},
    index::DocumentIndex,
    llm::LanguageModel,
    retriever::{Retriever, RetrieverConfig},
    state::{ConversationState, StateUpdate},
    thread::ThreadId,
};

/// Pipeline configuration
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub retriever: RetrieverConfig,
    pub generator: GeneratorConfig,
    /// Run turns on the same thread one at a time. When off, concurrent
    /// turns on one thread race and the later save wins.
    pub serialize_turns: bool,
}

type ThreadLocks = Mutex<HashMap<ThreadId, Arc<AsyncMutex<()>>>>;

/// A stream of per-stage updates, in execution order
pub type StageStream<'a> = Pin<Box<dyn Stream<Item = Result<StageUpdate>> + Send + 'a>>;

/// The two-stage retrieval-augmented pipeline
pub struct Pipeline {
    retriever: Retriever,
    generator: Generator,
    checkpointer: Arc<dyn Checkpointer>,
    serialize_turns: bool,
    thread_locks: ThreadLocks,
}

impl Pipeline {
    pub fn new(
        index: Arc<dyn DocumentIndex>,
        model: Arc<dyn LanguageModel>,
        checkpointer: Arc<dyn Checkpointer>,
        config: PipelineConfig,
    ) -> Self {
        tracing::debug!(
            "Building pipeline (top_k={}, serialize_turns={})",
            config.retriever.top_k,
            config.serialize_turns
        );
        Self {
            retriever: Retriever::new(index, config.retriever),
            generator: Generator::new(model, config.generator),
            checkpointer,
            serialize_turns: config.serialize_turns,
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Run one turn to completion and return the final state.
    ///
    /// With a thread id the prior checkpoint is loaded first and the result
    /// saved back; without one the turn is stateless.
    pub async fn invoke(
        &self,
        input: &str,
        thread_id: Option<&ThreadId>,
    ) -> Result<ConversationState> {
        let _guard = self.lock_thread(thread_id).await;
        let mut state = self.load(input, thread_id).await?;

        for stage in Stage::ORDER {
            let update = self.run_stage(stage, &state).await;
            state.apply(update);
        }

        self.persist(thread_id, &state).await?;
        Ok(state)
    }

    /// Run one turn, yielding the update from each stage as it completes.
    ///
    /// The checkpoint is saved before the final update is yielded, so a
    /// consumer that stops after the last stage still leaves the thread
    /// consistent. Dropping the stream earlier abandons the turn unsaved.
    pub fn stream<'a>(
        &'a self,
        input: &'a str,
        thread_id: Option<&'a ThreadId>,
    ) -> StageStream<'a> {
        Box::pin(stream! {
            let _guard = self.lock_thread(thread_id).await;
            let mut state = match self.load(input, thread_id).await {
                Ok(state) => state,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            for stage in Stage::ORDER {
                let update = self.run_stage(stage, &state).await;
                state.apply(update.clone());

                if stage.is_terminal() {
                    if let Err(e) = self.persist(thread_id, &state).await {
                        yield Err(e);
                        return;
                    }
                }

                yield Ok(StageUpdate { stage, update });
            }
        })
    }

    /// Messages stored for a thread, empty if it has never run
    pub async fn history(&self, thread_id: &ThreadId) -> Result<Vec<Message>> {
        Ok(self
            .checkpointer
            .get(thread_id)
            .await?
            .map(|c| c.state.messages)
            .unwrap_or_default())
    }

    /// Replace a thread's history, e.g. when resuming a saved transcript
    pub async fn seed(&self, thread_id: &ThreadId, messages: Vec<Message>) -> Result<()> {
        let state = ConversationState {
            messages,
            context: vec![],
        };
        tracing::info!("Seeding thread {} with {} messages", thread_id, state.messages.len());
        self.checkpointer.save(thread_id, &state).await
    }

    async fn run_stage(&self, stage: Stage, state: &ConversationState) -> StateUpdate {
        tracing::debug!("NODE: {} - starting", stage.name());
        let update = match stage {
            Stage::Retrieve => self.retriever.retrieve(state).await,
            Stage::Generate => self.generator.generate(state).await,
        };
        tracing::debug!("NODE: {} - done", stage.name());
        update
    }

    /// Build the starting state: prior checkpoint plus the new user turn
    async fn load(&self, input: &str, thread_id: Option<&ThreadId>) -> Result<ConversationState> {
        match thread_id {
            Some(id) => {
                let mut state = self.checkpointer.get_or_create(id).await?;
                tracing::debug!("Loaded thread {} ({} messages)", id, state.messages.len());
                state.apply(StateUpdate::messages(vec![Message::user(input)]));
                Ok(state)
            }
            None => Ok(ConversationState::from_input(input)),
        }
    }

    async fn persist(&self, thread_id: Option<&ThreadId>, state: &ConversationState) -> Result<()> {
        match thread_id {
            Some(id) => {
                self.checkpointer.save(id, state).await?;
                tracing::info!(
                    "Turn complete for thread {} ({} messages)",
                    id,
                    state.messages.len()
                );
            }
            None => tracing::info!("Stateless turn complete"),
        }
        Ok(())
    }

    async fn lock_thread(&self, thread_id: Option<&ThreadId>) -> Option<TurnGuard<'_>> {
        if !self.serialize_turns {
            return None;
        }
        let id = thread_id?;
        let lock = self
            .thread_locks
            .lock()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        Some(TurnGuard {
            guard: Some(lock.lock_owned().await),
            thread_id: id.clone(),
            locks: &self.thread_locks,
        })
    }
}

/// Holds a thread's turn lock. On release the lock is dropped from the map
/// unless another turn is already waiting on it.
struct TurnGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    thread_id: ThreadId,
    locks: &'a ThreadLocks,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Waiters clone the Arc under the map lock, so a count of one means
        // only the map still refers to it.
        let mut locks = self.locks.lock();
        if locks
            .get(&self.thread_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.thread_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{checkpoint::MemoryCheckpointer, index::Document};
    use async_trait::async_trait;
    use lore_ai::Context;
    use std::time::Duration;

    struct EmptyIndex;

    #[async_trait]
    impl DocumentIndex for EmptyIndex {
        async fn similarity_search(&self, _query: &str, _k: usize) -> Result<Vec<Document>> {
            Ok(vec![])
        }
    }

    struct SlowModel;

    #[async_trait]
    impl LanguageModel for SlowModel {
        async fn invoke(&self, _context: &Context) -> lore_ai::Result<Message> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Message::assistant("ok"))
        }

        fn model_id(&self) -> &str {
            "slow"
        }
    }

    fn serialized() -> Pipeline {
        Pipeline::new(
            Arc::new(EmptyIndex),
            Arc::new(SlowModel),
            Arc::new(MemoryCheckpointer::new()),
            PipelineConfig {
                serialize_turns: true,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_turn_locks_are_released_after_each_turn() {
        let pipeline = serialized();

        for n in 0..10 {
            let thread = ThreadId::new(format!("thread-{}", n));
            pipeline.invoke("hello", Some(&thread)).await.unwrap();
        }

        assert!(pipeline.thread_locks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_turn_lock_outlives_a_waiting_turn() {
        let pipeline = serialized();
        let thread = ThreadId::from("shared");

        let (a, b) = tokio::join!(
            pipeline.invoke("first", Some(&thread)),
            pipeline.invoke("second", Some(&thread)),
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(pipeline.history(&thread).await.unwrap().len(), 4);
        assert!(pipeline.thread_locks.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_stream_releases_its_lock() {
        use tokio_stream::StreamExt;

        let pipeline = serialized();
        let thread = ThreadId::from("abandoned");

        {
            let mut updates = pipeline.stream("hello", Some(&thread));
            let first = updates.next().await.unwrap().unwrap();
            assert_eq!(first.stage, Stage::Retrieve);
            assert_eq!(pipeline.thread_locks.lock().len(), 1);
        }

        assert!(pipeline.thread_locks.lock().is_empty());
    }
}
