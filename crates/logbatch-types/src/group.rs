use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Level, LogEvent};

/// Consecutive events considered duplicates of one another
///
/// A group is never empty: it is created from its head event and only grows.
/// All members share the head event's `(level, logger_name, message)` key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventGroup {
    events: Vec<LogEvent>,
}

impl EventGroup {
    pub fn new(event: LogEvent) -> Self {
        Self { events: vec![event] }
    }

    /// Append a duplicate; callers check [`matches`](Self::matches) first
    pub fn add(&mut self, event: LogEvent) {
        self.events.push(event);
    }

    pub fn matches(&self, event: &LogEvent) -> bool {
        self.head_event().same_key(event)
    }

    /// The first event, used as the representative example of the group
    pub fn head_event(&self) -> &LogEvent {
        &self.events[0]
    }

    pub fn first_event_time(&self) -> DateTime<Utc> {
        self.head_event().timestamp
    }

    pub fn latest_event_time(&self) -> DateTime<Utc> {
        self.events[self.events.len() - 1].timestamp
    }

    pub fn size(&self) -> usize {
        self.events.len()
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    pub fn level(&self) -> Level {
        self.head_event().level
    }

    pub fn message(&self) -> &str {
        &self.head_event().message
    }

    pub fn logger_name(&self) -> &str {
        &self.head_event().logger_name
    }

    pub fn into_events(self) -> Vec<LogEvent> {
        self.events
    }
}

impl std::fmt::Display for EventGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} x [{}] {}: {}",
            self.size(),
            self.level(),
            self.logger_name(),
            self.message()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_group_times_and_size() {
        let mut group = EventGroup::new(LogEvent::error("disk", "disk full").at(at(0)));
        group.add(LogEvent::error("disk", "disk full").at(at(2)));
        group.add(LogEvent::error("disk", "disk full").at(at(3)));

        assert_eq!(group.size(), 3);
        assert_eq!(group.first_event_time(), at(0));
        assert_eq!(group.latest_event_time(), at(3));
        assert_eq!(group.to_string(), "3 x [ERROR] disk: disk full");
    }

    #[test]
    fn test_group_matching() {
        let group = EventGroup::new(LogEvent::error("disk", "{} full").with_argument("/var"));

        assert!(group.matches(&LogEvent::error("disk", "{} full").with_argument("/home")));
        assert!(!group.matches(&LogEvent::warn("disk", "{} full")));
        assert!(!group.matches(&LogEvent::error("net", "{} full")));
        assert!(!group.matches(&LogEvent::error("disk", "{} almost full")));
    }
}
