use chrono::{TimeZone, Utc};
use logbatch_core::{
    BatchConfig, BatchScheduler, Batcher, Clock, KeyedBatcher, MemorySink, MonotonicClock,
    SharedTimerPool, ThrottleSchedule, ThrottleScheduler,
};
use logbatch_types::LogEvent;
use std::sync::Arc;
use std::time::Duration;

const TENANTS: usize = 100;

fn clock() -> Arc<MonotonicClock> {
    Arc::new(MonotonicClock::anchored_at(
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
    ))
}

fn cooldown_per_tenant(
    pool: SharedTimerPool,
    sink: Arc<MemorySink>,
    clock: Arc<MonotonicClock>,
) -> KeyedBatcher {
    KeyedBatcher::new("tenant", move |value, on_idle| {
        let mut builder = BatchScheduler::builder(pool.clone(), sink.clone())
            .name(value.unwrap_or("default"))
            .config(
                BatchConfig::new()
                    .with_idle_threshold(Duration::from_millis(10))
                    .with_cooldown_time(Duration::ZERO),
            )
            .clock(clock.clone())
            .register_for_shutdown(false);
        if let Some(on_idle) = on_idle {
            builder = builder.on_idle(on_idle);
        }
        builder.build() as Arc<dyn Batcher>
    })
}

fn throttle_per_tenant(pool: SharedTimerPool, sink: Arc<MemorySink>) -> KeyedBatcher {
    let schedule: ThrottleSchedule = "1s".parse().unwrap();
    KeyedBatcher::new("tenant", move |value, on_idle| {
        let mut builder = ThrottleScheduler::builder(pool.clone(), sink.clone(), schedule.clone())
            .name(value.unwrap_or("default"))
            .register_for_shutdown(false);
        if let Some(on_idle) = on_idle {
            builder = builder.on_idle(on_idle);
        }
        builder.build() as Arc<dyn Batcher>
    })
}

fn tenant_event(clock: &dyn Clock, tenant: usize) -> LogEvent {
    LogEvent::error("billing", "invoice rejected")
        .with_mdc("tenant", format!("tenant-{}", tenant))
        .at(clock.now())
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_tenants_leave_after_delivery() {
    let pool = SharedTimerPool::current().unwrap();
    let sink = Arc::new(MemorySink::new());
    let clock = clock();
    let keyed = cooldown_per_tenant(pool, sink.clone(), clock.clone());

    for tenant in 0..TENANTS {
        keyed.accept(tenant_event(clock.as_ref(), tenant));
    }
    assert_eq!(keyed.keys().len(), TENANTS);

    sink.wait_for_batches(TENANTS).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(keyed.keys().is_empty(), "still tracking {:?}", keyed.keys());
    assert_eq!(sink.event_count(), TENANTS);
    assert!(Batcher::is_idle(&keyed));
}

#[tokio::test(start_paused = true)]
async fn test_throttle_tenants_leave_after_empty_window() {
    let pool = SharedTimerPool::current().unwrap();
    let sink = Arc::new(MemorySink::new());
    let clock = clock();
    let keyed = throttle_per_tenant(pool, sink.clone());

    for tenant in 0..TENANTS {
        keyed.accept(tenant_event(clock.as_ref(), tenant));
    }

    // Delivered at once, then each cycle ends after one quiet second
    sink.wait_for_batches(TENANTS).await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(keyed.keys().is_empty(), "still tracking {:?}", keyed.keys());
    assert_eq!(sink.event_count(), TENANTS);
}

#[tokio::test(start_paused = true)]
async fn test_returning_tenant_gets_a_fresh_batcher() {
    let pool = SharedTimerPool::current().unwrap();
    let sink = Arc::new(MemorySink::new());
    let clock = clock();
    let keyed = cooldown_per_tenant(pool, sink.clone(), clock.clone());

    keyed.accept(tenant_event(clock.as_ref(), 7));
    sink.wait_for_batches(1).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(keyed.keys().is_empty());

    keyed.accept(tenant_event(clock.as_ref(), 7));
    assert_eq!(keyed.keys(), vec!["tenant-7".to_string()]);
    sink.wait_for_batches(2).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(keyed.keys().is_empty());
    assert_eq!(sink.event_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_default_batcher_is_never_removed() {
    let pool = SharedTimerPool::current().unwrap();
    let sink = Arc::new(MemorySink::new());
    let clock = clock();
    let keyed = cooldown_per_tenant(pool, sink.clone(), clock.clone());
    let default = Arc::clone(keyed.default_batcher());

    keyed.accept(LogEvent::warn("billing", "no tenant").at(clock.now()));
    sink.wait_for_batches(1).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(Arc::ptr_eq(&default, keyed.default_batcher()));
    assert!(keyed.keys().is_empty());
}
