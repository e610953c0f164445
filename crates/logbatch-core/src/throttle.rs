use async_trait::async_trait;
use logbatch_types::{Batch, LogEvent};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use crate::batcher::{Batcher, IdleHook};
use crate::config::ThrottleSchedule;
use crate::error::{BatchError, Result};
use crate::sink::DeliverySink;
use crate::status::{StatusReporter, TracingStatusReporter};
use crate::timer::{SharedTimerPool, TimerHandle};

struct ThrottleState {
    batch: Batch,
    index: usize,
    pending: Option<TimerHandle>,
}

/// Escalating-delay batching
///
/// With a schedule of `1m 10m 30m` the first event after a quiet period is
/// delivered right away. Anything arriving in the next minute is batched; if
/// that minute was not empty the next window is ten minutes, and so on up to
/// the last delay. A window with no events resets the schedule.
pub struct ThrottleScheduler {
    name: String,
    schedule: ThrottleSchedule,
    pool: SharedTimerPool,
    sink: Arc<dyn DeliverySink>,
    status: Arc<dyn StatusReporter>,
    state: Mutex<ThrottleState>,
    on_idle: Option<IdleHook>,
    this: Weak<ThrottleScheduler>,
}

impl ThrottleScheduler {
    pub fn builder(
        pool: SharedTimerPool,
        sink: Arc<dyn DeliverySink>,
        schedule: ThrottleSchedule,
    ) -> ThrottleSchedulerBuilder {
        ThrottleSchedulerBuilder {
            name: "throttle".to_string(),
            schedule,
            pool,
            sink,
            status: None,
            on_idle: None,
            register_for_shutdown: true,
        }
    }

    /// Add an event, starting a new throttle cycle if none is running
    ///
    /// Returns the delay of the flush started by this call, if any.
    pub fn record(&self, event: LogEvent) -> Option<Duration> {
        let started = {
            let mut state = self.lock_state();
            state.batch.push(event);
            if state.pending.is_some() {
                return None;
            }

            state.index = 0;
            let delay = self.schedule.delay(0);
            match self.schedule_tick(delay) {
                Ok(handle) => {
                    state.pending = Some(handle);
                    Ok(delay)
                }
                Err(e) => Err(e),
            }
        };

        match started {
            Ok(delay) => Some(delay),
            Err(e) => {
                self.status
                    .report(&self.name, "Failed to schedule flush", Some(&anyhow::Error::new(e)));
                None
            }
        }
    }

    /// Timer callback: deliver the window and pick the next delay
    ///
    /// An empty window ends the cycle and runs the idle hook.
    async fn tick(&self) -> usize {
        let (batch, rescheduled) = {
            let mut state = self.lock_state();
            let batch = std::mem::take(&mut state.batch);

            if batch.is_empty() {
                tracing::trace!(scheduler = %self.name, "Throttle window empty, resetting");
                state.index = 0;
                state.pending = None;
                drop(state);

                if let Some(on_idle) = &self.on_idle {
                    on_idle();
                }
                return 0;
            }

            state.index = (state.index + 1).min(self.schedule.last_index());
            let delay = self.schedule.delay(state.index);
            let rescheduled = match self.schedule_tick(delay) {
                Ok(handle) => {
                    tracing::debug!(scheduler = %self.name, "Next flush in {:?}", delay);
                    state.pending = Some(handle);
                    Ok(())
                }
                Err(e) => {
                    state.pending = None;
                    Err(e)
                }
            };
            (batch, rescheduled)
        };

        match rescheduled {
            Ok(()) | Err(BatchError::PoolShutdown) => {}
            Err(e) => {
                self.status
                    .report(&self.name, "Failed to schedule flush", Some(&anyhow::Error::new(e)));
            }
        }

        self.deliver(batch).await
    }

    /// Deliver whatever is pending without touching the throttle cycle
    pub async fn flush(&self) -> usize {
        let batch = std::mem::take(&mut self.lock_state().batch);
        self.deliver(batch).await
    }

    async fn deliver(&self, batch: Batch) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let events = batch.event_count();
        tracing::debug!(scheduler = %self.name, events, "Delivering throttled batch");
        if let Err(e) = self.sink.deliver(batch).await {
            self.status.report(&self.name, "Failed to process batch", Some(&e));
        }
        events
    }

    fn schedule_tick(&self, delay: Duration) -> Result<TimerHandle> {
        let this = self
            .this
            .upgrade()
            .ok_or_else(|| BatchError::Runtime("scheduler is being dropped".to_string()))?;
        self.pool.schedule(delay, async move {
            this.tick().await;
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, ThrottleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Position in the throttle schedule of the running cycle
    pub fn throttle_index(&self) -> usize {
        self.lock_state().index
    }

    pub fn current_batch(&self) -> Batch {
        self.lock_state().batch.clone()
    }

    /// True while a throttle cycle is running
    pub fn has_pending_flush(&self) -> bool {
        self.lock_state().pending.is_some()
    }

    pub fn schedule(&self) -> &ThrottleSchedule {
        &self.schedule
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Batcher for ThrottleScheduler {
    fn accept(&self, event: LogEvent) {
        self.record(event);
    }

    fn pending_events(&self) -> usize {
        self.lock_state().batch.event_count()
    }

    fn is_idle(&self) -> bool {
        let state = self.lock_state();
        state.batch.is_empty() && state.pending.is_none()
    }

    async fn flush(&self) -> usize {
        ThrottleScheduler::flush(self).await
    }
}

impl std::fmt::Debug for ThrottleScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThrottleScheduler")
            .field("name", &self.name)
            .field("schedule", &self.schedule.to_string())
            .finish()
    }
}

pub struct ThrottleSchedulerBuilder {
    name: String,
    schedule: ThrottleSchedule,
    pool: SharedTimerPool,
    sink: Arc<dyn DeliverySink>,
    status: Option<Arc<dyn StatusReporter>>,
    on_idle: Option<IdleHook>,
    register_for_shutdown: bool,
}

impl ThrottleSchedulerBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn status_reporter(mut self, status: Arc<dyn StatusReporter>) -> Self {
        self.status = Some(status);
        self
    }

    /// Run `on_idle` when an empty window ends the throttle cycle
    pub fn on_idle(mut self, on_idle: IdleHook) -> Self {
        self.on_idle = Some(on_idle);
        self
    }

    pub fn register_for_shutdown(mut self, register: bool) -> Self {
        self.register_for_shutdown = register;
        self
    }

    pub fn build(self) -> Arc<ThrottleScheduler> {
        let pool = self.pool.clone();
        let scheduler = Arc::new_cyclic(|this| ThrottleScheduler {
            name: self.name,
            schedule: self.schedule,
            pool: self.pool,
            sink: self.sink,
            status: self.status.unwrap_or_else(|| Arc::new(TracingStatusReporter)),
            state: Mutex::new(ThrottleState {
                batch: Batch::new(),
                index: 0,
                pending: None,
            }),
            on_idle: self.on_idle,
            this: this.clone(),
        });

        if self.register_for_shutdown {
            let batcher: Arc<dyn Batcher> = scheduler.clone();
            pool.shutdown_hook().add_action(Arc::downgrade(&batcher));
        }

        scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use crate::status::RecordingStatusReporter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn schedule() -> ThrottleSchedule {
        "1m 10m 30m".parse().unwrap()
    }

    fn event(message: &str) -> LogEvent {
        LogEvent::error("payments", message)
    }

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_event_flushes_immediately() {
        let pool = SharedTimerPool::current().unwrap();
        let sink = Arc::new(MemorySink::new());
        let throttle = ThrottleScheduler::builder(pool, sink.clone(), schedule()).build();

        assert_eq!(throttle.record(event("card declined")), Some(Duration::ZERO));
        assert_eq!(throttle.record(event("card declined")), None);

        sink.wait_for_batches(1).await;
        assert_eq!(sink.batches()[0].event_count(), 2);
        assert_eq!(throttle.throttle_index(), 1);
        assert!(throttle.has_pending_flush());
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalates_then_resets() {
        let pool = SharedTimerPool::current().unwrap();
        let sink = Arc::new(MemorySink::new());
        let throttle = ThrottleScheduler::builder(pool, sink.clone(), schedule()).build();

        throttle.record(event("a"));
        sink.wait_for_batches(1).await;

        // Second window lasts one minute
        throttle.record(event("b"));
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(sink.batch_count(), 1);
        sink.wait_for_batches(2).await;
        assert_eq!(throttle.throttle_index(), 2);

        // Ten quiet minutes reset the cycle
        tokio::time::sleep(Duration::from_secs(601)).await;
        settle().await;
        assert_eq!(throttle.throttle_index(), 0);
        assert!(!throttle.has_pending_flush());
        assert!(Batcher::is_idle(throttle.as_ref()));

        assert_eq!(throttle.record(event("c")), Some(Duration::ZERO));
        sink.wait_for_batches(3).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_window_runs_idle_hook() {
        let pool = SharedTimerPool::current().unwrap();
        let sink = Arc::new(MemorySink::new());
        let idle_calls = Arc::new(AtomicUsize::new(0));
        let calls = idle_calls.clone();
        let throttle = ThrottleScheduler::builder(pool, sink.clone(), schedule())
            .on_idle(Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
            }))
            .build();

        throttle.record(event("a"));
        sink.wait_for_batches(1).await;
        assert_eq!(idle_calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(61)).await;
        settle().await;
        assert_eq!(idle_calls.load(Ordering::SeqCst), 1);
        assert!(Batcher::is_idle(throttle.as_ref()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_index_saturates_at_last_delay() {
        let pool = SharedTimerPool::current().unwrap();
        let sink = Arc::new(MemorySink::new());
        let throttle =
            ThrottleScheduler::builder(pool, sink.clone(), "1s 2s".parse().unwrap()).build();

        for round in 1..=5 {
            throttle.record(event("busy"));
            sink.wait_for_batches(round).await;
        }
        assert_eq!(throttle.throttle_index(), 2);
        assert_eq!(throttle.schedule().delay(throttle.throttle_index()), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduling_failure_clears_cycle() {
        let pool = SharedTimerPool::current().unwrap();
        let sink = Arc::new(MemorySink::new());
        let status = Arc::new(RecordingStatusReporter::new());
        let throttle = ThrottleScheduler::builder(pool.clone(), sink.clone(), schedule())
            .register_for_shutdown(false)
            .status_reporter(status.clone())
            .build();

        pool.shutdown().await;
        assert_eq!(throttle.record(event("lost timer")), None);
        assert!(!throttle.has_pending_flush());
        assert_eq!(status.messages(), vec!["Failed to schedule flush".to_string()]);

        assert_eq!(throttle.flush().await, 1);
        assert_eq!(sink.event_count(), 1);
    }
}
