//! The link store and the engine that updates it.
//!
//! A [`LinkStore`] owns every [`LinkRecord`], keyed by base URL. The caller
//! notes the bookmarks it cares about this run with
//! [`LinkStore::interested_in`], then [`LinkStore::check_for_updates`]
//! checks those records out of the map, runs them through the
//! [`scheduler`], and checks them back in.

pub mod lifecycle;
mod persist;
pub mod scheduler;
mod types;

pub use lifecycle::{apply, process, Effect, Event};
pub use persist::StoreError;
pub use scheduler::{BatchSummary, UpdateSettings};
pub use types::{Article, LinkRecord, LinkState};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// All known links plus the set noted for the current run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkStore {
    #[serde(default)]
    links: BTreeMap<String, LinkRecord>,
    /// Noted base URLs in first-noted order. Never persisted.
    #[serde(skip)]
    noted: Vec<String>,
    #[serde(skip)]
    noted_set: HashSet<String>,
}

impl LinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `url` for this run.
    ///
    /// Creates a `New` record if the URL is unknown; an existing record is
    /// left exactly as it is. Noting the same URL twice has no effect.
    pub fn interested_in(&mut self, url: &str, title: &str) {
        if !self.links.contains_key(url) {
            tracing::debug!(url = %url, title = %title, "New link");
            self.links
                .insert(url.to_owned(), LinkRecord::new(url, title));
        }
        if self.noted_set.insert(url.to_owned()) {
            self.noted.push(url.to_owned());
        }
    }

    /// Base URLs noted this run, in the order they were first noted.
    pub fn noted(&self) -> &[String] {
        &self.noted
    }

    pub fn get(&self, url: &str) -> Option<&LinkRecord> {
        self.links.get(url)
    }

    pub fn get_mut(&mut self, url: &str) -> Option<&mut LinkRecord> {
        self.links.get_mut(url)
    }

    pub fn links(&self) -> impl Iterator<Item = &LinkRecord> {
        self.links.values()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Processes every noted link and waits for all of them.
    ///
    /// Records are removed from the map for the duration of the batch and
    /// reinserted afterwards, so nothing can observe a record mid-update.
    pub async fn check_for_updates(
        &mut self,
        client: &reqwest::Client,
        settings: &UpdateSettings,
    ) -> BatchSummary {
        let checked_out: Vec<LinkRecord> = self
            .noted
            .iter()
            .filter_map(|url| self.links.remove(url))
            .collect();

        let finished = scheduler::run_batch(client, checked_out, settings).await;
        let summary = scheduler::summarize(&finished);

        for record in finished {
            self.links.insert(record.base_url.clone(), record);
        }

        tracing::info!(
            processed = summary.processed,
            has_feed = summary.count(LinkState::HasFeed),
            transient = summary.count(LinkState::TransientError),
            no_feed = summary.count(LinkState::NoFeedFound),
            "Update batch complete"
        );
        summary
    }
}
