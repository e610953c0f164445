//! Prelude module for convenient imports
//!
//! Import everything you need with:
//! ```rust
//! use logbatch::prelude::*;
//! ```

pub use crate::{
    Batch, EventGroup, Level, LogEvent,
    BatchConfig, BatcherConfig, ThrottleSchedule, TimerPoolConfig,
    BatchScheduler, ThrottleScheduler, KeyedBatcher, Batcher, BatcherFactory,
    SharedTimerPool, DeliverySink, BlockingSink, StatusReporter, BatchError,
};
