use async_trait::async_trait;
use futures::future::join_all;
use logbatch_types::LogEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::batcher::{Batcher, IdleHook};

type BatcherMap = HashMap<String, Arc<dyn Batcher>>;
type MakeBatcher = dyn Fn(Option<&str>, Option<IdleHook>) -> Arc<dyn Batcher> + Send + Sync;

/// Splits events into one batcher per diagnostic-context value
///
/// Events carrying `key` in their MDC are routed to a batcher dedicated to
/// that value, created on first use. Events without the key share a default
/// batcher.
///
/// Each keyed batcher is built with an idle hook that removes it from the map
/// once a flush leaves it empty, so the map only holds values seen since
/// their last delivery. [`flush`] and [`prune`] drop idle batchers as well.
///
/// [`flush`]: KeyedBatcher::flush
/// [`prune`]: KeyedBatcher::prune
pub struct KeyedBatcher {
    key: String,
    default: Arc<dyn Batcher>,
    keyed: Arc<Mutex<BatcherMap>>,
    make: Box<MakeBatcher>,
}

impl KeyedBatcher {
    /// # Arguments
    /// * `key` - MDC key to route on
    /// * `make` - Builds an inner batcher; receives the MDC value, or `None`
    ///   for the default batcher, and the hook the batcher must run when it
    ///   goes idle (`None` for the default batcher)
    pub fn new<F>(key: impl Into<String>, make: F) -> Self
    where
        F: Fn(Option<&str>, Option<IdleHook>) -> Arc<dyn Batcher> + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            default: make(None, None),
            keyed: Arc::new(Mutex::new(HashMap::new())),
            make: Box::new(make),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Batcher for events without the key
    pub fn default_batcher(&self) -> &Arc<dyn Batcher> {
        &self.default
    }

    /// Batcher currently serving `value`
    pub fn batcher_for(&self, value: &str) -> Option<Arc<dyn Batcher>> {
        self.lock_keyed().get(value).cloned()
    }

    /// MDC values with a live batcher, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock_keyed().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn route(&self, event: &LogEvent) -> Arc<dyn Batcher> {
        let Some(value) = event.mdc(&self.key) else {
            return Arc::clone(&self.default);
        };

        let mut keyed = self.lock_keyed();
        if let Some(batcher) = keyed.get(value) {
            return Arc::clone(batcher);
        }

        tracing::debug!("Creating batcher for {}={}", self.key, value);
        let batcher = (self.make)(Some(value), Some(self.idle_hook(value)));
        keyed.insert(value.to_string(), Arc::clone(&batcher));
        batcher
    }

    /// Hook that removes the batcher for `value` if it is idle when called
    ///
    /// Holds the map weakly so inner batchers never keep it alive.
    fn idle_hook(&self, value: &str) -> IdleHook {
        let keyed = Arc::downgrade(&self.keyed);
        let key = self.key.clone();
        let value = value.to_string();
        Arc::new(move || {
            let Some(map) = keyed.upgrade() else {
                return;
            };
            let mut batchers = map.lock().unwrap_or_else(PoisonError::into_inner);
            if batchers.get(&value).is_some_and(|batcher| batcher.is_idle()) {
                batchers.remove(&value);
                tracing::trace!("Removed idle batcher for {}={}", key, value);
            }
        })
    }

    /// Drop keyed batchers with nothing pending
    ///
    /// Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut keyed = self.lock_keyed();
        let before = keyed.len();
        keyed.retain(|_, batcher| !batcher.is_idle());
        let removed = before - keyed.len();
        if removed > 0 {
            tracing::trace!("Pruned {} idle batchers for key {}", removed, self.key);
        }
        removed
    }

    /// Flush every inner batcher, then prune the idle ones
    pub async fn flush(&self) -> usize {
        let mut batchers: Vec<Arc<dyn Batcher>> = vec![Arc::clone(&self.default)];
        batchers.extend(self.lock_keyed().values().cloned());

        let flushed = join_all(batchers.iter().map(|batcher| batcher.flush())).await;
        self.prune();
        flushed.into_iter().sum()
    }

    fn lock_keyed(&self) -> MutexGuard<'_, BatcherMap> {
        self.keyed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Batcher for KeyedBatcher {
    fn accept(&self, event: LogEvent) {
        self.route(&event).accept(event);
    }

    fn pending_events(&self) -> usize {
        let keyed: usize = self
            .lock_keyed()
            .values()
            .map(|batcher| batcher.pending_events())
            .sum();
        self.default.pending_events() + keyed
    }

    fn is_idle(&self) -> bool {
        self.default.is_idle() && self.lock_keyed().values().all(|batcher| batcher.is_idle())
    }

    async fn flush(&self) -> usize {
        KeyedBatcher::flush(self).await
    }
}

impl std::fmt::Debug for KeyedBatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedBatcher")
            .field("key", &self.key)
            .field("keys", &self.keys())
            .finish()
    }
}
