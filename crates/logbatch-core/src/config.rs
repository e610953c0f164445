// Configuration for schedulers and the shared timer pool.
// Durations are read and written as humantime strings ("5s", "1m 30s").

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{BatchError, Result};

/// Timing policy for a debounce/cooldown scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Quiet period after the latest event before flushing
    #[serde(with = "humantime_serde")]
    pub idle_threshold: Duration,

    /// Minimum spacing between two deliveries
    #[serde(with = "humantime_serde")]
    pub cooldown_time: Duration,

    /// Upper bound from the first event in a batch until it is flushed
    #[serde(with = "humantime_serde")]
    pub maximum_wait_time: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            idle_threshold: Duration::from_secs(5),
            cooldown_time: Duration::from_secs(15),
            maximum_wait_time: Duration::from_secs(60),
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_threshold(mut self, idle_threshold: Duration) -> Self {
        self.idle_threshold = idle_threshold;
        self
    }

    pub fn with_cooldown_time(mut self, cooldown_time: Duration) -> Self {
        self.cooldown_time = cooldown_time;
        self
    }

    pub fn with_maximum_wait_time(mut self, maximum_wait_time: Duration) -> Self {
        self.maximum_wait_time = maximum_wait_time;
        self
    }
}

/// Escalating flush delays for a throttling scheduler
///
/// Always starts with an implicit zero delay, so the first event after a
/// quiet period is flushed right away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ThrottleSchedule {
    delays: Vec<Duration>,
}

impl ThrottleSchedule {
    pub fn new(delays: impl IntoIterator<Item = Duration>) -> Result<Self> {
        let mut all = vec![Duration::ZERO];
        all.extend(delays);
        if all.len() < 2 {
            return Err(BatchError::InvalidThrottle {
                value: String::new(),
                reason: "at least one delay is required".to_string(),
            });
        }
        Ok(Self { delays: all })
    }

    /// Delay at `index`, saturating at the last entry
    pub fn delay(&self, index: usize) -> Duration {
        let last = self.delays.len() - 1;
        self.delays[index.min(last)]
    }

    pub fn last_index(&self) -> usize {
        self.delays.len() - 1
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

impl FromStr for ThrottleSchedule {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self> {
        let mut delays = Vec::new();
        for token in s.split(|c: char| c.is_whitespace() || c == ',') {
            if token.is_empty() {
                continue;
            }
            let delay = humantime::parse_duration(token).map_err(|e| BatchError::InvalidThrottle {
                value: s.to_string(),
                reason: format!("'{}': {}", token, e),
            })?;
            delays.push(delay);
        }
        Self::new(delays).map_err(|_| BatchError::InvalidThrottle {
            value: s.to_string(),
            reason: "at least one delay is required".to_string(),
        })
    }
}

impl TryFrom<String> for ThrottleSchedule {
    type Error = BatchError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ThrottleSchedule> for String {
    fn from(schedule: ThrottleSchedule) -> Self {
        schedule.to_string()
    }
}

impl fmt::Display for ThrottleSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.delays[1..]
            .iter()
            .map(|d| humantime::format_duration(*d).to_string())
            .collect();
        f.write_str(&parts.join(" "))
    }
}

/// Sizing of the shared timer pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerPoolConfig {
    pub worker_threads: usize,
    pub thread_name: String,
    /// Maximum number of outstanding timers before scheduling is refused
    pub max_pending: usize,
}

impl Default for TimerPoolConfig {
    fn default() -> Self {
        Self {
            worker_threads: 2,
            thread_name: "logbatch-timer".to_string(),
            max_pending: 10_000,
        }
    }
}

impl TimerPoolConfig {
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }
}

/// Full description of one batching observer
///
/// With `throttle` set the throttling strategy is used, otherwise the
/// debounce/cooldown timing applies. `mdc_key` splits events into one batcher
/// per diagnostic-context value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    #[serde(flatten)]
    pub timing: BatchConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle: Option<ThrottleSchedule>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mdc_key: Option<String>,
}

impl BatcherConfig {
    pub fn cooldown(timing: BatchConfig) -> Self {
        Self {
            timing,
            throttle: None,
            mdc_key: None,
        }
    }

    pub fn throttle(schedule: ThrottleSchedule) -> Self {
        Self {
            timing: BatchConfig::default(),
            throttle: Some(schedule),
            mdc_key: None,
        }
    }

    pub fn with_mdc_key(mut self, key: impl Into<String>) -> Self {
        self.mdc_key = Some(key.into());
        self
    }

    /// Validate settings that serde cannot check
    pub fn validate(&self) -> Result<()> {
        if let Some(key) = &self.mdc_key {
            if key.trim().is_empty() {
                return Err(BatchError::Config("mdc_key must not be empty".to_string()));
            }
        }
        Ok(())
    }
}
