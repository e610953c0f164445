use anyhow::Result;
use async_trait::async_trait;
use logbatch_core::DeliverySink;
use logbatch_types::{Batch, Level};

/// Logs one line per delivered group
///
/// Stands in for a chat or mail notifier: the most severe group becomes the
/// headline and every group is listed underneath it.
#[derive(Debug, Clone)]
pub struct SummarySink {
    observer: String,
}

impl SummarySink {
    pub fn new(observer: impl Into<String>) -> Self {
        Self {
            observer: observer.into(),
        }
    }

    pub fn observer(&self) -> &str {
        &self.observer
    }
}

/// Headline followed by one line per group, the headline group marked with `*`
pub fn summary_lines(batch: &Batch) -> Vec<String> {
    let Some(main) = batch.first_highest_level_group() else {
        return Vec::new();
    };

    let mut lines = Vec::with_capacity(batch.len() + 1);
    let others = batch.event_count() - main.size();
    if others > 0 {
        lines.push(format!("{} (+{} more)", main.message(), others));
    } else {
        lines.push(main.message().to_string());
    }

    for group in batch {
        let marker = if batch.is_main_group(group) { "*" } else { "-" };
        lines.push(format!("{} {}", marker, group));
    }
    lines
}

#[async_trait]
impl DeliverySink for SummarySink {
    async fn deliver(&self, batch: Batch) -> Result<()> {
        let level = batch
            .first_highest_level_group()
            .map(|group| group.level())
            .unwrap_or(Level::Info);

        for line in summary_lines(&batch) {
            if level >= Level::Error {
                tracing::warn!(observer = %self.observer, "{}", line);
            } else {
                tracing::info!(observer = %self.observer, "{}", line);
            }
        }
        Ok(())
    }
}
