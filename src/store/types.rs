use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LinkError;

// ============================================================================
// Link State
// ============================================================================

/// How much we know about a bookmark's feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Freshly bookmarked; we don't know whether it has a feed.
    #[default]
    New,
    /// Discovery failed permanently this run.
    NoFeedFound,
    /// The last attempt failed in a way that should heal on its own.
    TransientError,
    /// `feed_url` holds a confirmed feed.
    HasFeed,
    /// Set by the user editing the store. Never set or changed by us.
    Ignored,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::New => "new",
            LinkState::NoFeedFound => "no_feed_found",
            LinkState::TransientError => "transient_error",
            LinkState::HasFeed => "has_feed",
            LinkState::Ignored => "ignored",
        }
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Article
// ============================================================================

/// One entry from a feed. Rebuilt from scratch on every refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub title: String,
    /// `None` when the item carried no date; sorts before every real date.
    pub published: Option<DateTime<Utc>>,
}

// ============================================================================
// Link Record
// ============================================================================

/// Everything we track about one bookmarked URL.
///
/// Owned by [`LinkStore`](super::LinkStore) and lent to exactly one worker
/// at a time while an update batch runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    /// URL from the bookmark file. Identity key; never changes.
    pub base_url: String,
    pub title: String,
    #[serde(default)]
    pub state: LinkState,
    /// Non-empty whenever `state == HasFeed`. Kept through transient errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,
    /// Present only while the record is in `TransientError` (or gave up).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LinkError>,
    /// Publish time of the newest article the user has seen.
    #[serde(default)]
    pub last_read: Option<DateTime<Utc>>,
    /// Start time of the last successful refresh.
    #[serde(default)]
    pub last_checked: Option<DateTime<Utc>>,
    /// Consecutive failed discovery attempts; reset when a feed is found.
    #[serde(default)]
    pub discovery_failures: u32,
    /// Articles from the last successful refresh, oldest first.
    #[serde(default)]
    pub articles: Vec<Article>,
}

impl LinkRecord {
    pub fn new(base_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            title: title.into(),
            state: LinkState::New,
            feed_url: None,
            last_error: None,
            last_read: None,
            last_checked: None,
            discovery_failures: 0,
            articles: Vec::new(),
        }
    }

    /// Articles published strictly after `last_read`, oldest first.
    pub fn unread_articles(&self) -> Vec<&Article> {
        self.articles
            .iter()
            .filter(|a| a.published > self.last_read)
            .collect()
    }

    /// Advances `last_read` to the newest publish time in `articles`.
    ///
    /// Never moves `last_read` backwards.
    pub fn mark_all_as_read(&mut self) {
        let latest = self.articles.iter().filter_map(|a| a.published).max();
        if latest > self.last_read {
            self.last_read = latest;
        }
    }

    /// Records a failure and parks the record in `TransientError`.
    ///
    /// `feed_url` is left alone so the next run can go straight back to
    /// refreshing instead of rediscovering.
    pub fn error_occurred(&mut self, err: LinkError) {
        self.state = LinkState::TransientError;
        self.last_error = Some(err);
    }

    /// The configured feed URL, if it is set and non-empty.
    pub fn feed_url(&self) -> Option<&str> {
        self.feed_url.as_deref().filter(|u| !u.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn article(n: u32, published: Option<DateTime<Utc>>) -> Article {
        Article {
            url: format!("https://example.com/{n}"),
            title: format!("Post {n}"),
            published,
        }
    }

    #[test]
    fn test_unread_strictly_after_last_read() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut record = LinkRecord::new("https://example.com", "Example");
        record.last_read = Some(t);
        record.articles = vec![
            article(1, Some(t - Duration::seconds(1))),
            article(2, Some(t)),
            article(3, Some(t + Duration::seconds(1))),
            article(4, Some(t + Duration::seconds(2))),
        ];

        let unread: Vec<_> = record.unread_articles().into_iter().cloned().collect();
        assert_eq!(unread, record.articles[2..].to_vec());

        record.mark_all_as_read();
        assert_eq!(record.last_read, Some(t + Duration::seconds(2)));
        assert!(record.unread_articles().is_empty());
    }

    #[test]
    fn test_nothing_read_yet_means_all_dated_articles_unread() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut record = LinkRecord::new("https://example.com", "Example");
        record.articles = vec![article(1, None), article(2, Some(t))];

        let unread = record.unread_articles();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].title, "Post 2");
    }

    #[test]
    fn test_mark_all_as_read_never_moves_backwards() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut record = LinkRecord::new("https://example.com", "Example");
        record.last_read = Some(t);
        record.articles = vec![article(1, Some(t - Duration::days(3)))];

        record.mark_all_as_read();
        assert_eq!(record.last_read, Some(t));

        record.articles.clear();
        record.mark_all_as_read();
        assert_eq!(record.last_read, Some(t));
    }

    #[test]
    fn test_error_keeps_feed_url() {
        let mut record = LinkRecord::new("https://x", "X");
        record.state = LinkState::HasFeed;
        record.feed_url = Some("https://x/f.xml".into());

        record.error_occurred(LinkError::transient("connection refused"));

        assert_eq!(record.state, LinkState::TransientError);
        assert_eq!(record.feed_url(), Some("https://x/f.xml"));
        assert!(record.last_error.as_ref().unwrap().is_transient());
    }

    #[test]
    fn test_empty_feed_url_counts_as_missing() {
        let mut record = LinkRecord::new("https://x", "X");
        record.feed_url = Some(String::new());
        assert_eq!(record.feed_url(), None);
    }
}
