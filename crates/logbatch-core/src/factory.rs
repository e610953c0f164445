use std::sync::Arc;

use crate::batcher::{Batcher, IdleHook};
use crate::clock::{Clock, SystemClock};
use crate::config::BatcherConfig;
use crate::error::Result;
use crate::keyed::KeyedBatcher;
use crate::scheduler::BatchScheduler;
use crate::sink::DeliverySink;
use crate::status::{StatusReporter, TracingStatusReporter};
use crate::throttle::ThrottleScheduler;
use crate::timer::SharedTimerPool;

/// Builds batchers from configuration, all sharing one timer pool
///
/// Every batcher it creates is registered with the pool's shutdown hook.
#[derive(Clone)]
pub struct BatcherFactory {
    pool: SharedTimerPool,
    status: Arc<dyn StatusReporter>,
    clock: Arc<dyn Clock>,
}

impl BatcherFactory {
    pub fn new(pool: SharedTimerPool) -> Self {
        Self {
            pool,
            status: Arc::new(TracingStatusReporter),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_status_reporter(mut self, status: Arc<dyn StatusReporter>) -> Self {
        self.status = status;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn pool(&self) -> &SharedTimerPool {
        &self.pool
    }

    /// Create the batcher described by `config`
    ///
    /// A throttle schedule selects [`ThrottleScheduler`], otherwise
    /// [`BatchScheduler`] is used. With an `mdc_key` the chosen strategy is
    /// wrapped in a [`KeyedBatcher`].
    pub fn create(
        &self,
        name: &str,
        config: &BatcherConfig,
        sink: Arc<dyn DeliverySink>,
    ) -> Result<Arc<dyn Batcher>> {
        config.validate()?;

        let batcher: Arc<dyn Batcher> = match &config.mdc_key {
            None => self.build_strategy(name.to_string(), config, sink, None, true),
            Some(key) => {
                let factory = self.clone();
                let config = config.clone();
                let base = name.to_string();
                let keyed = KeyedBatcher::new(key.clone(), move |value, on_idle| {
                    let name = match value {
                        Some(value) => format!("{}[{}]", base, value),
                        None => base.clone(),
                    };
                    factory.build_strategy(name, &config, Arc::clone(&sink), on_idle, false)
                });
                let keyed: Arc<dyn Batcher> = Arc::new(keyed);
                self.pool.shutdown_hook().add_action(Arc::downgrade(&keyed));
                keyed
            }
        };

        tracing::info!(
            "Created batcher '{}' ({})",
            name,
            if config.throttle.is_some() { "throttle" } else { "cooldown" }
        );
        Ok(batcher)
    }

    fn build_strategy(
        &self,
        name: String,
        config: &BatcherConfig,
        sink: Arc<dyn DeliverySink>,
        on_idle: Option<IdleHook>,
        register_for_shutdown: bool,
    ) -> Arc<dyn Batcher> {
        match &config.throttle {
            Some(schedule) => {
                let mut builder =
                    ThrottleScheduler::builder(self.pool.clone(), sink, schedule.clone())
                        .name(name)
                        .status_reporter(Arc::clone(&self.status))
                        .register_for_shutdown(register_for_shutdown);
                if let Some(on_idle) = on_idle {
                    builder = builder.on_idle(on_idle);
                }
                builder.build()
            }
            None => {
                let mut builder = BatchScheduler::builder(self.pool.clone(), sink)
                    .name(name)
                    .config(config.timing)
                    .status_reporter(Arc::clone(&self.status))
                    .clock(Arc::clone(&self.clock))
                    .register_for_shutdown(register_for_shutdown);
                if let Some(on_idle) = on_idle {
                    builder = builder.on_idle(on_idle);
                }
                builder.build()
            }
        }
    }
}

impl std::fmt::Debug for BatcherFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatcherFactory")
            .field("pool", &self.pool)
            .field("clock", &self.clock)
            .finish()
    }
}
