use serde::Serialize;

use crate::{EventGroup, LogEvent};

/// Ordered groups of events accumulated since the last flush
///
/// Groups are kept in order of first occurrence. Only the most recently
/// created group (the *open* group) can still grow: an incoming event either
/// extends it or starts a new group behind it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Batch {
    groups: Vec<EventGroup>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event, grouping it with the open group when the keys match
    ///
    /// Returns the group the event ended up in.
    pub fn push(&mut self, event: LogEvent) -> &EventGroup {
        match self.groups.last_mut() {
            Some(open) if open.matches(&event) => open.add(event),
            _ => self.groups.push(EventGroup::new(event)),
        }
        let last = self.groups.len() - 1;
        &self.groups[last]
    }

    /// The group that new matching events are appended to
    pub fn open_group(&self) -> Option<&EventGroup> {
        self.groups.last()
    }

    pub fn first(&self) -> Option<&EventGroup> {
        self.groups.first()
    }

    pub fn groups(&self) -> &[EventGroup] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Number of events across all groups
    pub fn event_count(&self) -> usize {
        self.groups.iter().map(EventGroup::size).sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EventGroup> {
        self.groups.iter()
    }

    /// All events in delivery order
    pub fn events(&self) -> impl Iterator<Item = &LogEvent> {
        self.groups.iter().flat_map(|g| g.events().iter())
    }

    /// The earliest group among those with the highest level
    ///
    /// Sinks use this as the headline of a notification.
    pub fn first_highest_level_group(&self) -> Option<&EventGroup> {
        let mut best: Option<&EventGroup> = None;
        for group in &self.groups {
            match best {
                Some(b) if b.level() >= group.level() => {}
                _ => best = Some(group),
            }
        }
        best
    }

    /// True if `group` has the same key as the headline group
    pub fn is_main_group(&self, group: &EventGroup) -> bool {
        self.first_highest_level_group()
            .is_some_and(|main| main.matches(group.head_event()))
    }
}

impl IntoIterator for Batch {
    type Item = EventGroup;
    type IntoIter = std::vec::IntoIter<EventGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a EventGroup;
    type IntoIter = std::slice::Iter<'a, EventGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_groups_consecutive_duplicates() {
        let mut batch = Batch::new();
        batch.push(LogEvent::error("disk", "disk full").with_argument(1));
        batch.push(LogEvent::error("disk", "disk full").with_argument(2));
        batch.push(LogEvent::warn("net", "slow response"));
        batch.push(LogEvent::error("disk", "disk full"));

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.event_count(), 4);
        assert_eq!(batch.groups()[0].size(), 2);
        assert_eq!(batch.groups()[0].head_event().arguments[0], json!(1));
        assert_eq!(batch.groups()[0].events()[1].arguments[0], json!(2));
        assert_eq!(batch.open_group().unwrap().message(), "disk full");
        assert_eq!(batch.open_group().unwrap().size(), 1);
    }

    #[test]
    fn test_first_highest_level_group() {
        let mut batch = Batch::new();
        batch.push(LogEvent::warn("a", "first warning"));
        batch.push(LogEvent::error("b", "first error"));
        batch.push(LogEvent::info("c", "info"));
        batch.push(LogEvent::error("d", "second error"));

        let main = batch.first_highest_level_group().unwrap();
        assert_eq!(main.message(), "first error");
        assert!(batch.is_main_group(&batch.groups()[1]));
        assert!(!batch.is_main_group(&batch.groups()[3]));
    }

    #[test]
    fn test_empty_batch() {
        let batch = Batch::new();
        assert!(batch.is_empty());
        assert!(batch.open_group().is_none());
        assert!(batch.first_highest_level_group().is_none());
        assert_eq!(batch.events().count(), 0);
    }
}
