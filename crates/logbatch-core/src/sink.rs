use anyhow::{Context, Result};
use async_trait::async_trait;
use logbatch_types::Batch;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Notify;

/// Downstream consumer of finalized batches
///
/// Called from a flush task, at most once per flush, never retried.
/// Implementations own formatting and transport. Errors are reported through
/// the scheduler's status channel and the batch is dropped.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, batch: Batch) -> Result<()>;
}

/// Adapts a synchronous processor into a sink
///
/// The processor runs on tokio's blocking pool so that slow I/O inside it
/// never holds up timer tasks.
pub struct BlockingSink<F> {
    processor: Arc<F>,
}

impl<F> BlockingSink<F>
where
    F: Fn(Batch) -> Result<()> + Send + Sync + 'static,
{
    pub fn new(processor: F) -> Self {
        Self {
            processor: Arc::new(processor),
        }
    }
}

#[async_trait]
impl<F> DeliverySink for BlockingSink<F>
where
    F: Fn(Batch) -> Result<()> + Send + Sync + 'static,
{
    async fn deliver(&self, batch: Batch) -> Result<()> {
        let processor = Arc::clone(&self.processor);
        tokio::task::spawn_blocking(move || processor(batch))
            .await
            .context("Batch processor panicked")?
    }
}

/// Keeps delivered batches in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Batch>>,
    delivered: Notify,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<Batch> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn batch_count(&self) -> usize {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn event_count(&self) -> usize {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(Batch::event_count)
            .sum()
    }

    /// Wait until at least `count` batches have been delivered
    pub async fn wait_for_batches(&self, count: usize) {
        loop {
            let notified = self.delivered.notified();
            if self.batch_count() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl DeliverySink for MemorySink {
    async fn deliver(&self, batch: Batch) -> Result<()> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(batch);
        self.delivered.notify_waiters();
        Ok(())
    }
}
