use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Level;

/// One discrete log occurrence
///
/// Events are immutable once built: the builder methods consume `self`.
/// The `(level, logger_name, message)` triple is the grouping key used by
/// [`EventGroup`](crate::EventGroup); `arguments` are not part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub level: Level,

    /// Name of the logger (source) that produced the event
    pub logger_name: String,

    /// Message template, before argument substitution
    pub message: String,

    /// Values substituted into the template
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<serde_json::Value>,

    pub timestamp: DateTime<Utc>,

    /// Diagnostic context captured when the event was created
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mdc: BTreeMap<String, String>,
}

impl LogEvent {
    pub fn new(level: Level, logger_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            logger_name: logger_name.into(),
            message: message.into(),
            arguments: Vec::new(),
            timestamp: Utc::now(),
            mdc: BTreeMap::new(),
        }
    }

    pub fn error(logger_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Level::Error, logger_name, message)
    }

    pub fn warn(logger_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Level::Warn, logger_name, message)
    }

    pub fn info(logger_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Level::Info, logger_name, message)
    }

    /// Set the event timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_argument(mut self, argument: impl Into<serde_json::Value>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Vec<serde_json::Value>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_mdc(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.mdc.insert(key.into(), value.into());
        self
    }

    /// Look up a diagnostic context value
    pub fn mdc(&self, key: &str) -> Option<&str> {
        self.mdc.get(key).map(String::as_str)
    }

    /// True if both events share level, logger name and message template
    pub fn same_key(&self, other: &LogEvent) -> bool {
        self.level == other.level
            && self.logger_name == other.logger_name
            && self.message == other.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_builder() {
        let event = LogEvent::error("db.pool", "Connection to {} failed")
            .with_argument("primary")
            .with_mdc("tenant", "acme");

        assert_eq!(event.level, Level::Error);
        assert_eq!(event.arguments, vec![json!("primary")]);
        assert_eq!(event.mdc("tenant"), Some("acme"));
        assert_eq!(event.mdc("user"), None);
    }

    #[test]
    fn test_same_key_ignores_arguments() {
        let a = LogEvent::warn("disk", "{} is full").with_argument("/var");
        let b = LogEvent::warn("disk", "{} is full").with_argument("/tmp");
        let c = LogEvent::error("disk", "{} is full").with_argument("/var");

        assert!(a.same_key(&b));
        assert!(!a.same_key(&c));
    }
}
