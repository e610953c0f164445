//! Core data model for logbatch: log events, duplicate groups and batches.

pub mod batch;
pub mod event;
pub mod group;
pub mod level;

pub use batch::Batch;
pub use event::LogEvent;
pub use group::EventGroup;
pub use level::{Level, ParseLevelError};
