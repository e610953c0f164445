use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use logbatch_core::{Batcher, BatcherFactory, MonotonicClock, SharedTimerPool};
use logbatch_demo::{config::Config, replay, SummarySink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    init_logging(&config);

    tracing::info!("Starting logbatch demo");
    tracing::info!(
        "Timer pool: {} workers, {} observers configured",
        config.pool.worker_threads,
        config.observers.len()
    );

    let pool = SharedTimerPool::new(&config.pool)?;
    let factory = BatcherFactory::new(pool.clone()).with_clock(Arc::new(MonotonicClock::new()));

    let mut batchers: Vec<(String, Arc<dyn Batcher>)> = Vec::new();
    for (name, observer) in &config.observers {
        let sink = Arc::new(SummarySink::new(name.clone()));
        let batcher = factory.create(name, observer, sink)?;
        batchers.push((name.clone(), batcher));
    }

    if batchers.is_empty() {
        tracing::warn!("No observers configured, nothing to do");
        return Ok(());
    }

    let sent = replay(&batchers, &config.demo).await;
    tracing::info!("Replayed {} events into {} batchers", sent, batchers.len());

    let pending: usize = batchers.iter().map(|(_, b)| b.pending_events()).sum();
    tracing::info!("Shutting down with {} events pending", pending);
    let flushed = pool.shutdown().await;
    tracing::info!("Flushed {} batchers on shutdown", flushed);

    Ok(())
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }
}
