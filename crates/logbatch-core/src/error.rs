use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Timer pool is shut down")]
    PoolShutdown,

    #[error("Timer pool exhausted: {limit} timers already pending")]
    PoolExhausted { limit: usize },

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Invalid throttle schedule '{value}': {reason}")]
    InvalidThrottle { value: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BatchError>;
