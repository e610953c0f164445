use futures::future::join_all;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::batcher::Batcher;

/// Flushes registered batchers when the application shuts down
///
/// Holds weak references only: registering a batcher never keeps it alive.
#[derive(Default)]
pub struct ShutdownHook {
    actions: Mutex<Vec<Weak<dyn Batcher>>>,
}

impl ShutdownHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_action(&self, batcher: Weak<dyn Batcher>) {
        tracing::trace!("Adding shutdown action");
        let mut actions = self.actions.lock().unwrap_or_else(PoisonError::into_inner);
        actions.retain(|action| action.strong_count() > 0);
        actions.push(batcher);
    }

    /// Number of registered batchers that are still alive
    pub fn len(&self) -> usize {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|action| action.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush every live batcher, returning how many were flushed
    pub async fn run(&self) -> usize {
        let batchers: Vec<Arc<dyn Batcher>> = {
            let actions = self.actions.lock().unwrap_or_else(PoisonError::into_inner);
            actions.iter().filter_map(Weak::upgrade).collect()
        };

        tracing::info!("Flushing up to {} batchers", batchers.len());
        let flushed = join_all(batchers.iter().map(|batcher| batcher.flush())).await;
        let events: usize = flushed.iter().sum();
        tracing::debug!("Flushed {} batchers ({} events)", batchers.len(), events);

        batchers.len()
    }
}

impl std::fmt::Debug for ShutdownHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHook")
            .field("actions", &self.len())
            .finish()
    }
}
