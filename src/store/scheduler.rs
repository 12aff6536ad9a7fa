use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::store::lifecycle::process;
use crate::store::{LinkRecord, LinkState};

/// Default worker pool size.
pub const DEFAULT_WORKERS: usize = 8;
/// Minimum time between two article refreshes of the same link.
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(300);
/// Cap on any single response body.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Knobs for one update batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSettings {
    /// Records processed concurrently. Zero is treated as one.
    pub workers: usize,
    pub min_check_interval: Duration,
    /// Failed discoveries after which a link stays in `NoFeedFound`.
    /// `None` retries forever.
    pub max_discovery_attempts: Option<u32>,
    pub max_body_bytes: usize,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            min_check_interval: MIN_CHECK_INTERVAL,
            max_discovery_attempts: None,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }
}

impl UpdateSettings {
    /// Whether a link that has failed discovery `failures` times may try again.
    pub fn discovery_allowed(&self, failures: u32) -> bool {
        self.max_discovery_attempts
            .map_or(true, |max| failures < max)
    }
}

/// Resulting state counts for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub by_state: HashMap<LinkState, usize>,
}

impl BatchSummary {
    pub fn count(&self, state: LinkState) -> usize {
        self.by_state.get(&state).copied().unwrap_or(0)
    }

    fn record(&mut self, state: LinkState) {
        self.processed += 1;
        *self.by_state.entry(state).or_default() += 1;
    }
}

/// Runs every record through its state machine, at most
/// `settings.workers` at a time, and returns them once all are done.
///
/// Each record is moved into exactly one future, so no two workers can
/// touch the same record. Completion order follows the network, not the
/// input; the caller re-keys records by `base_url`.
pub async fn run_batch(
    client: &reqwest::Client,
    records: Vec<LinkRecord>,
    settings: &UpdateSettings,
) -> Vec<LinkRecord> {
    let total = records.len();
    if total == 0 {
        return Vec::new();
    }

    let workers = settings.workers.max(1);
    let completed = AtomicUsize::new(0);
    tracing::info!(links = total, workers, "Checking links for updates");

    stream::iter(records)
        .map(|mut record| {
            let completed = &completed;
            async move {
                process(client, &mut record, settings).await;
                let done = completed.fetch_add(1, Ordering::Relaxed).saturating_add(1);
                tracing::debug!(done, total, link = %record.title, "Link finished");
                record
            }
        })
        .buffer_unordered(workers)
        .collect()
        .await
}

/// Tallies the final state of each record.
pub fn summarize<'a>(records: impl IntoIterator<Item = &'a LinkRecord>) -> BatchSummary {
    let mut summary = BatchSummary::default();
    for record in records {
        summary.record(record.state);
    }
    summary
}
