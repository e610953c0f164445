//! # Logbatch
//!
//! Turns bursts of log events into a few grouped notifications.
//!
//! ## Overview
//!
//! Notification-style sinks (chat webhooks, mail, pagers) cannot take one
//! message per log event. Logbatch sits in front of such a sink and:
//!
//! - **Groups** consecutive events with the same level, logger and message
//! - **Debounces** delivery until events stop arriving for an idle threshold
//! - **Rate-limits** deliveries with a cooldown between flushes
//! - **Caps latency** so no event waits longer than a maximum wait time
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use logbatch::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = SharedTimerPool::current()?;
//!     let sink = Arc::new(BlockingSink::new(|batch: Batch| {
//!         for group in &batch {
//!             println!("{}", group);
//!         }
//!         Ok(())
//!     }));
//!
//!     let scheduler = BatchScheduler::builder(pool.clone(), sink)
//!         .name("alerts")
//!         .config(BatchConfig::new().with_idle_threshold(Duration::from_secs(2)))
//!         .build();
//!
//!     scheduler.accept(LogEvent::error("storage", "Disk {} is full").with_argument("/var"));
//!     scheduler.accept(LogEvent::error("storage", "Disk {} is full").with_argument("/tmp"));
//!
//!     // Deliver whatever is still pending
//!     pool.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`logbatch-types`**: Log events, duplicate groups and batches
//! - **`logbatch-core`**: Schedulers, the shared timer pool, sinks and configuration
//!
//! ## License
//!
//! MIT

pub mod prelude;

pub use logbatch_types::{Batch, EventGroup, Level, LogEvent, ParseLevelError};

pub use logbatch_core::{
    next_flush_delay, BatchConfig, BatchError, BatchScheduler, Batcher, BatcherConfig,
    BatcherFactory, BlockingSink, Clock, DeliverySink, IdleHook, KeyedBatcher, ManualClock,
    MemorySink, MonotonicClock, RecordingStatusReporter, SharedTimerPool, ShutdownHook,
    StatusReporter, SystemClock, ThrottleSchedule, ThrottleScheduler, TimerHandle,
    TimerPoolConfig, TracingStatusReporter,
};
