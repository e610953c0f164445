use logbatch_core::Batcher;
use logbatch_types::{Level, LogEvent};
use std::sync::Arc;

use crate::config::DemoConfig;

// (level, logger, message template)
const CATALOG: &[(Level, &str, &str)] = &[
    (Level::Error, "storage", "Disk {} is full"),
    (Level::Error, "storage", "Disk {} is full"),
    (Level::Warn, "http", "Slow response from {}"),
    (Level::Error, "payments", "Card declined for order {}"),
    (Level::Error, "storage", "Disk {} is full"),
    (Level::Info, "jobs", "Nightly export finished"),
];

/// The `seq`-th event of the burst
///
/// Repeats a short catalog, so consecutive duplicates occur and get grouped.
/// With tenants configured, each event carries a `tenant` MDC value.
pub fn synthetic_event(seq: usize, tenants: &[String]) -> LogEvent {
    let (level, logger, message) = CATALOG[seq % CATALOG.len()];
    let mut event = LogEvent::new(level, logger, message).with_argument(seq as u64);
    if !tenants.is_empty() {
        event = event.with_mdc("tenant", tenants[(seq / CATALOG.len()) % tenants.len()].clone());
    }
    event
}

/// Feed the configured burst to every batcher
///
/// Returns the number of events produced (each batcher receives all of them).
pub async fn replay(batchers: &[(String, Arc<dyn Batcher>)], demo: &DemoConfig) -> usize {
    let mut seq = 0;
    for round in 0..demo.rounds {
        for _ in 0..demo.events_per_round {
            let event = synthetic_event(seq, &demo.tenants);
            for (_, batcher) in batchers {
                batcher.accept(event.clone());
            }
            seq += 1;
        }

        let pending: usize = batchers.iter().map(|(_, b)| b.pending_events()).sum();
        tracing::debug!("Round {} sent, {} events pending", round + 1, pending);

        if round + 1 < demo.rounds {
            tokio::time::sleep(demo.interval).await;
        }
    }
    seq
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_events_repeat_catalog() {
        let tenants = vec!["acme".to_string(), "globex".to_string()];

        let first = synthetic_event(0, &tenants);
        let second = synthetic_event(1, &tenants);
        assert!(first.same_key(&second));
        assert_eq!(first.mdc("tenant"), Some("acme"));

        let next_cycle = synthetic_event(CATALOG.len(), &tenants);
        assert!(first.same_key(&next_cycle));
        assert_eq!(next_cycle.mdc("tenant"), Some("globex"));

        assert_eq!(synthetic_event(0, &[]).mdc("tenant"), None);
    }
}
