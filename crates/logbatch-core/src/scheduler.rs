use async_trait::async_trait;
use chrono::{DateTime, Utc};
use logbatch_types::{Batch, LogEvent};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use crate::batcher::{Batcher, IdleHook};
use crate::clock::{plus, until, Clock, SystemClock};
use crate::config::BatchConfig;
use crate::error::{BatchError, Result};
use crate::sink::DeliverySink;
use crate::status::{StatusReporter, TracingStatusReporter};
use crate::timer::{SharedTimerPool, TimerHandle};

/// Delay until the batch should be flushed, or `None` for an empty batch
///
/// * Once the first event has waited `maximum_wait_time`, flush now.
/// * Otherwise wait for both the idle deadline (latest event in the open
///   group + `idle_threshold`) and the cooldown deadline (last flush +
///   `cooldown_time`), whichever is later.
pub fn next_flush_delay(
    batch: &Batch,
    last_flush_time: DateTime<Utc>,
    config: &BatchConfig,
    now: DateTime<Utc>,
) -> Option<Duration> {
    let first_in_batch = batch.first()?.first_event_time();
    let open_group = batch.open_group()?;

    if now >= plus(first_in_batch, config.maximum_wait_time) {
        return Some(Duration::ZERO);
    }

    let idle_deadline = plus(open_group.latest_event_time(), config.idle_threshold);
    let cooldown_deadline = plus(last_flush_time, config.cooldown_time);
    let earliest = idle_deadline.max(cooldown_deadline);

    Some(until(now, earliest))
}

struct SchedulerState {
    batch: Batch,
    last_flush_time: DateTime<Utc>,
    pending: Option<TimerHandle>,
}

/// Debounce-with-deadline batching in front of a delivery sink
///
/// Consecutive duplicate events are grouped, and the batch is flushed once
/// events stop arriving for `idle_threshold`. Deliveries are spaced at least
/// `cooldown_time` apart, and no event waits longer than `maximum_wait_time`.
///
/// All state lives behind one mutex. The sink is always called after the
/// lock is released, so a slow sink never holds up `record`.
pub struct BatchScheduler {
    name: String,
    config: BatchConfig,
    pool: SharedTimerPool,
    sink: Arc<dyn DeliverySink>,
    status: Arc<dyn StatusReporter>,
    clock: Arc<dyn Clock>,
    state: Mutex<SchedulerState>,
    on_idle: Option<IdleHook>,
    this: Weak<BatchScheduler>,
}

impl BatchScheduler {
    pub fn builder(pool: SharedTimerPool, sink: Arc<dyn DeliverySink>) -> BatchSchedulerBuilder {
        BatchSchedulerBuilder::new(pool, sink)
    }

    /// Add an event and reschedule the flush
    ///
    /// Cancels the pending flush (best-effort), groups the event and schedules
    /// a new flush. Returns the computed delay. If the flush cannot be
    /// scheduled the failure is reported and the batch stays pending until
    /// the next call.
    pub fn record(&self, event: LogEvent, now: DateTime<Utc>) -> Duration {
        let (delay, scheduled) = {
            let mut state = self.lock_state();
            if let Some(previous) = state.pending.take() {
                previous.cancel();
            }

            state.batch.push(event);
            let delay = next_flush_delay(&state.batch, state.last_flush_time, &self.config, now)
                .unwrap_or(Duration::ZERO);

            match self.schedule_flush(delay) {
                Ok(handle) => {
                    state.pending = Some(handle);
                    (delay, Ok(()))
                }
                Err(e) => (delay, Err(e)),
            }
        };

        if let Err(e) = scheduled {
            self.status
                .report(&self.name, "Failed to schedule flush", Some(&anyhow::Error::new(e)));
        }

        delay
    }

    /// Take the batch and hand it to the sink
    ///
    /// Normally invoked by the timer pool. Sink failures are reported and the
    /// batch is dropped. Returns the number of events handed over.
    ///
    /// Runs the idle hook afterwards if nothing arrived in the meantime.
    pub async fn flush(&self) -> usize {
        let batch = self.take_batch();
        let events = batch.event_count();

        if !batch.is_empty() {
            tracing::debug!(
                scheduler = %self.name,
                groups = batch.len(),
                events,
                "Delivering batch"
            );

            if let Err(e) = self.sink.deliver(batch).await {
                self.status.report(&self.name, "Failed to process batch", Some(&e));
            }
        }

        if let Some(on_idle) = &self.on_idle {
            if Batcher::is_idle(self) {
                on_idle();
            }
        }

        events
    }

    fn take_batch(&self) -> Batch {
        let mut state = self.lock_state();
        state.last_flush_time = self.clock.now();
        // A handle that has not started belongs to a newer `record`
        if state.pending.as_ref().is_some_and(TimerHandle::has_started) {
            state.pending = None;
        }
        std::mem::take(&mut state.batch)
    }

    fn schedule_flush(&self, delay: Duration) -> Result<TimerHandle> {
        let this = self
            .this
            .upgrade()
            .ok_or_else(|| BatchError::Runtime("scheduler is being dropped".to_string()))?;
        self.pool.schedule(delay, async move {
            this.flush().await;
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delay a flush scheduled at `now` would get, `None` if nothing is pending
    pub fn compute_next_flush_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        let state = self.lock_state();
        next_flush_delay(&state.batch, state.last_flush_time, &self.config, now)
    }

    /// Copy of the live batch
    pub fn current_batch(&self) -> Batch {
        self.lock_state().batch.clone()
    }

    pub fn last_flush_time(&self) -> DateTime<Utc> {
        self.lock_state().last_flush_time
    }

    /// True while a scheduled flush has neither started nor been cancelled
    pub fn has_pending_flush(&self) -> bool {
        self.lock_state()
            .pending
            .as_ref()
            .is_some_and(|handle| !handle.has_started() && !handle.is_cancelled())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }
}

#[async_trait]
impl Batcher for BatchScheduler {
    fn accept(&self, event: LogEvent) {
        self.record(event, self.clock.now());
    }

    fn pending_events(&self) -> usize {
        self.lock_state().batch.event_count()
    }

    fn is_idle(&self) -> bool {
        self.lock_state().batch.is_empty()
    }

    async fn flush(&self) -> usize {
        BatchScheduler::flush(self).await
    }
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

pub struct BatchSchedulerBuilder {
    name: String,
    config: BatchConfig,
    pool: SharedTimerPool,
    sink: Arc<dyn DeliverySink>,
    status: Option<Arc<dyn StatusReporter>>,
    clock: Option<Arc<dyn Clock>>,
    on_idle: Option<IdleHook>,
    register_for_shutdown: bool,
}

impl BatchSchedulerBuilder {
    pub fn new(pool: SharedTimerPool, sink: Arc<dyn DeliverySink>) -> Self {
        Self {
            name: "batch".to_string(),
            config: BatchConfig::default(),
            pool,
            sink,
            status: None,
            clock: None,
            on_idle: None,
            register_for_shutdown: true,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn config(mut self, config: BatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn status_reporter(mut self, status: Arc<dyn StatusReporter>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Run `on_idle` whenever a flush leaves the scheduler empty
    pub fn on_idle(mut self, on_idle: IdleHook) -> Self {
        self.on_idle = Some(on_idle);
        self
    }

    /// Whether the pool's shutdown hook should flush this scheduler
    pub fn register_for_shutdown(mut self, register: bool) -> Self {
        self.register_for_shutdown = register;
        self
    }

    pub fn build(self) -> Arc<BatchScheduler> {
        let pool = self.pool.clone();
        let scheduler = Arc::new_cyclic(|this| BatchScheduler {
            name: self.name,
            config: self.config,
            pool: self.pool,
            sink: self.sink,
            status: self.status.unwrap_or_else(|| Arc::new(TracingStatusReporter)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            state: Mutex::new(SchedulerState {
                batch: Batch::new(),
                last_flush_time: DateTime::<Utc>::UNIX_EPOCH,
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
