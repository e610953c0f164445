pub mod batcher;
pub mod clock;
pub mod config;
pub mod error;
pub mod factory;
pub mod keyed;
pub mod scheduler;
pub mod shutdown;
pub mod sink;
pub mod status;
pub mod throttle;
pub mod timer;

pub use batcher::{Batcher, IdleHook};
pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use config::{BatchConfig, BatcherConfig, ThrottleSchedule, TimerPoolConfig};
pub use error::{BatchError, Result};
pub use factory::BatcherFactory;
pub use keyed::KeyedBatcher;
pub use scheduler::{next_flush_delay, BatchScheduler, BatchSchedulerBuilder};
pub use shutdown::ShutdownHook;
pub use sink::{BlockingSink, DeliverySink, MemorySink};
pub use status::{RecordingStatusReporter, StatusEntry, StatusReporter, TracingStatusReporter};
pub use throttle::{ThrottleScheduler, ThrottleSchedulerBuilder};
pub use timer::{SharedTimerPool, TimerHandle};
