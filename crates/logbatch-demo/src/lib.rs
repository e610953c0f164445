pub mod burst;
pub mod config;
pub mod sink;

pub use burst::{replay, synthetic_event};
pub use config::{Config, DemoConfig, LoggingConfig};
pub use sink::{summary_lines, SummarySink};
