use chrono::{DateTime, Utc};
use std::sync::{Mutex, PoisonError};

/// Low-level diagnostics channel for the batching core
///
/// Failures inside the scheduler (a sink returning an error, a flush that could
/// not be scheduled) are reported here instead of being logged through the
/// pipeline the scheduler itself belongs to.
pub trait StatusReporter: Send + Sync {
    /// Report a problem
    ///
    /// # Arguments
    /// * `source` - Name of the scheduler or component reporting
    /// * `message` - What went wrong
    /// * `error` - The underlying error, if any
    fn report(&self, source: &str, message: &str, error: Option<&anyhow::Error>);
}

/// Reports through `tracing` under the `logbatch::status` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatusReporter;

impl StatusReporter for TracingStatusReporter {
    fn report(&self, source: &str, message: &str, error: Option<&anyhow::Error>) {
        match error {
            Some(e) => tracing::error!(
                target: "logbatch::status",
                source = source,
                error = %format!("{:#}", e),
                "{}",
                message
            ),
            None => tracing::error!(target: "logbatch::status", source = source, "{}", message),
        }
    }
}

/// A single reported status entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub source: String,
    pub message: String,
    pub error: Option<String>,
    pub reported_at: DateTime<Utc>,
}

/// Keeps every report in memory
#[derive(Debug, Default)]
pub struct RecordingStatusReporter {
    entries: Mutex<Vec<StatusEntry>>,
}

impl RecordingStatusReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<StatusEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .map(|entry| entry.message)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl StatusReporter for RecordingStatusReporter {
    fn report(&self, source: &str, message: &str, error: Option<&anyhow::Error>) {
        let entry = StatusEntry {
            source: source.to_string(),
            message: message.to_string(),
            error: error.map(|e| format!("{:#}", e)),
            reported_at: Utc::now(),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_reporter() {
        let reporter = RecordingStatusReporter::new();
        assert!(reporter.is_empty());

        let error = anyhow::anyhow!("connection refused").context("webhook post failed");
        reporter.report("alerts", "Failed to process batch", Some(&error));
        reporter.report("alerts", "Failed to schedule flush", None);

        let entries = reporter.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source, "alerts");
        assert_eq!(
            entries[0].error.as_deref(),
            Some("webhook post failed: connection refused")
        );
        assert_eq!(entries[1].error, None);

        reporter.clear();
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_tracing_reporter_does_not_panic() {
        let reporter = TracingStatusReporter;
        reporter.report("alerts", "Failed to process batch", Some(&anyhow::anyhow!("boom")));
    }
}
