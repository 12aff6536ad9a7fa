//! Per-link state machine.
//!
//! [`apply`] is a pure transition function: it takes the record and one
//! [`Event`], updates the record, and says which [`Effect`] the caller has
//! to perform next. [`process`] is the async driver that performs the
//! network effects and feeds their outcomes back in until [`Effect::Stop`].
//!
//! ```text
//!   TransientError ──(feed url kept)──▶ HasFeed ──refresh──▶ stop
//!        │                                ▲
//!        └──(no feed url)──▶ New ──found──┘
//!                             │
//!                             ├─ transient ─▶ TransientError, stop
//!                             └─ permanent ─▶ NoFeedFound, stop
//! ```

use crate::error::LinkError;
use crate::feed::{discover_feed, refresh_articles, DiscoveredFeed, Refresh};
use crate::store::scheduler::UpdateSettings;
use crate::store::{LinkRecord, LinkState};

/// Input to [`apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Look at the current state and decide what to do.
    Evaluate,
    Discovered(DiscoveredFeed),
    DiscoveryFailed(LinkError),
    Refreshed(Refresh),
    RefreshFailed(LinkError),
}

/// What the driver must do after [`apply`] returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// State changed without I/O; evaluate again.
    Continue,
    /// Run feed discovery and report back with `Discovered`/`DiscoveryFailed`.
    Discover,
    /// Run an article refresh and report back with `Refreshed`/`RefreshFailed`.
    Refresh,
    /// Done with this record for this pass.
    Stop,
}

/// Advances `record` by one event.
///
/// Never performs I/O. `Evaluate` on a `NoFeedFound` record only happens at
/// the start of a pass (a pass that reaches `NoFeedFound` stops there), so
/// that is where a record with discovery attempts left is revived.
pub fn apply(record: &mut LinkRecord, event: Event, settings: &UpdateSettings) -> Effect {
    match event {
        Event::Evaluate => evaluate(record, settings),

        Event::Discovered(found) => {
            if found.feed_url.is_empty() {
                return apply(
                    record,
                    Event::DiscoveryFailed(LinkError::permanent("discovery returned an empty feed URL")),
                    settings,
                );
            }
            record.state = LinkState::HasFeed;
            record.feed_url = Some(found.feed_url);
            record.last_error = None;
            record.discovery_failures = 0;
            if record.title.trim().is_empty() {
                if let Some(title) = found.page_title {
                    record.title = title;
                }
            }
            Effect::Continue
        }

        Event::DiscoveryFailed(err) => {
            record.discovery_failures = record.discovery_failures.saturating_add(1);
            if err.is_transient() {
                tracing::info!(link = %record.title, error = %err, "Discovery failed, will retry");
                record.error_occurred(err);
            } else {
                tracing::info!(link = %record.title, error = %err, "No feed found");
                record.state = LinkState::NoFeedFound;
                record.last_error = Some(err);
            }
            Effect::Stop
        }

        Event::Refreshed(Refresh::Fetched {
            articles,
            checked_at,
        }) => {
            record.articles = articles;
            record.last_checked = Some(checked_at);
            record.last_error = None;
            Effect::Stop
        }
        // Neither outcome changes the record
        Event::Refreshed(Refresh::RateLimited | Refresh::UnknownFormat) => Effect::Stop,

        Event::RefreshFailed(err) => {
            tracing::warn!(link = %record.title, error = %err, "Article refresh failed");
            record.error_occurred(err);
            Effect::Stop
        }
    }
}

fn evaluate(record: &mut LinkRecord, settings: &UpdateSettings) -> Effect {
    match record.state {
        LinkState::Ignored => {
            tracing::debug!(link = %record.title, "Ignoring");
            Effect::Stop
        }
        LinkState::TransientError => {
            record.state = if record.feed_url().is_some() {
                LinkState::HasFeed
            } else {
                LinkState::New
            };
            Effect::Continue
        }
        LinkState::NoFeedFound => {
            if settings.discovery_allowed(record.discovery_failures) {
                record.state = LinkState::New;
                Effect::Continue
            } else {
                Effect::Stop
            }
        }
        // The previous error stays visible until another attempt replaces it
        LinkState::New => {
            if settings.discovery_allowed(record.discovery_failures) {
                record.last_error = None;
                Effect::Discover
            } else {
                tracing::debug!(
                    link = %record.title,
                    attempts = record.discovery_failures,
                    "Discovery attempts exhausted"
                );
                record.state = LinkState::NoFeedFound;
                Effect::Stop
            }
        }
        LinkState::HasFeed => {
            if record.feed_url().is_some() {
                record.last_error = None;
                Effect::Refresh
            } else {
                // Hand-edited store: no feed to refresh, so look for one
                tracing::warn!(link = %record.title, "HasFeed without a feed URL, rediscovering");
                record.state = LinkState::New;
                record.feed_url = None;
                Effect::Continue
            }
        }
    }
}

/// Drives one record through its state machine for this pass.
///
/// Never fails: every error ends up on the record.
pub async fn process(client: &reqwest::Client, record: &mut LinkRecord, settings: &UpdateSettings) {
    let mut event = Event::Evaluate;
    loop {
        let effect = apply(record, event, settings);
        debug_assert!(
            record.state != LinkState::HasFeed || record.feed_url().is_some(),
            "HasFeed without feed URL"
        );

        event = match effect {
            Effect::Continue => Event::Evaluate,
            Effect::Discover => {
                match discover_feed(client, &record.base_url, &record.title, settings.max_body_bytes).await {
                    Ok(found) => Event::Discovered(found),
                    Err(e) => Event::DiscoveryFailed(e),
                }
            }
            Effect::Refresh => {
                match refresh_articles(
                    client,
                    record,
                    settings.min_check_interval,
                    settings.max_body_bytes,
                )
                .await
                {
                    Ok(refresh) => Event::Refreshed(refresh),
                    Err(e) => Event::RefreshFailed(e),
                }
            }
            Effect::Stop => break,
        };
    }
    tracing::debug!(link = %record.title, state = %record.state, "Link processed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Article;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ALL_STATES: [LinkState; 5] = [
        LinkState::New,
        LinkState::NoFeedFound,
        LinkState::TransientError,
        LinkState::HasFeed,
        LinkState::Ignored,
    ];

    fn record(state: LinkState, feed_url: Option<&str>) -> LinkRecord {
        let mut record = LinkRecord::new("https://x/", "X");
        record.state = state;
        record.feed_url = feed_url.map(str::to_owned);
        record
    }

    fn found(url: &str) -> DiscoveredFeed {
        DiscoveredFeed {
            feed_url: url.to_owned(),
            page_title: Some("Page".into()),
        }
    }

    /// Runs `apply` with canned outcomes for each effect, returning the
    /// effects requested in order.
    fn run(
        record: &mut LinkRecord,
        settings: &UpdateSettings,
        discovery: impl Fn() -> Event,
        refresh: impl Fn() -> Event,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let mut event = Event::Evaluate;
        for _ in 0..16 {
            let effect = apply(record, event, settings);
            effects.push(effect);
            event = match effect {
                Effect::Continue => Event::Evaluate,
                Effect::Discover => discovery(),
                Effect::Refresh => refresh(),
                Effect::Stop => return effects,
            };
        }
        panic!("state machine did not stop: {effects:?}");
    }

    #[test]
    fn test_every_state_terminates_and_keeps_has_feed_invariant() {
        let settings = UpdateSettings::default();
        let discoveries: [fn() -> Event; 3] = [
            || Event::Discovered(found("https://x/feed")),
            || Event::DiscoveryFailed(LinkError::transient("down")),
            || Event::DiscoveryFailed(LinkError::permanent("404")),
        ];
        let refreshes: [fn() -> Event; 3] = [
            || Event::Refreshed(Refresh::RateLimited),
            || Event::Refreshed(Refresh::UnknownFormat),
            || Event::RefreshFailed(LinkError::transient("refused")),
        ];

        for state in ALL_STATES {
            for feed_url in [None, Some("https://x/f.xml")] {
                for discovery in discoveries {
                    for refresh in refreshes {
                        let mut rec = record(state, feed_url);
                        run(&mut rec, &settings, discovery, refresh);
                        if rec.state == LinkState::HasFeed {
                            assert!(rec.feed_url().is_some(), "{state:?} {feed_url:?}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_new_discovers_then_refreshes() {
        let mut rec = record(LinkState::New, None);
        let effects = run(
            &mut rec,
            &UpdateSettings::default(),
            || Event::Discovered(found("https://x/feed")),
            || Event::Refreshed(Refresh::RateLimited),
        );
        assert_eq!(
            effects,
            vec![Effect::Discover, Effect::Continue, Effect::Refresh, Effect::Stop]
        );
        assert_eq!(rec.state, LinkState::HasFeed);
        assert_eq!(rec.feed_url(), Some("https://x/feed"));
        // Bookmark title wins over the page title
        assert_eq!(rec.title, "X");
    }

    #[test]
    fn test_transient_discovery_failure() {
        let mut rec = record(LinkState::New, None);
        run(
            &mut rec,
            &UpdateSettings::default(),
            || Event::DiscoveryFailed(LinkError::transient("no feed link found")),
            || unreachable!(),
        );
        assert_eq!(rec.state, LinkState::TransientError);
        assert_eq!(rec.discovery_failures, 1);
        assert!(rec.last_error.as_ref().unwrap().is_transient());
    }

    #[test]
    fn test_permanent_discovery_failure_stops_this_pass() {
        let mut rec = record(LinkState::New, None);
        let effects = run(
            &mut rec,
            &UpdateSettings::default(),
            || Event::DiscoveryFailed(LinkError::permanent("Error 404 reading https://x/")),
            || unreachable!(),
        );
        assert_eq!(effects, vec![Effect::Discover, Effect::Stop]);
        assert_eq!(rec.state, LinkState::NoFeedFound);
        assert_eq!(rec.last_error.as_ref().unwrap().message, "Error 404 reading https://x/");
    }

    #[test]
    fn test_no_feed_found_revived_next_pass() {
        let mut rec = record(LinkState::NoFeedFound, None);
        rec.discovery_failures = 3;
        let effects = run(
            &mut rec,
            &UpdateSettings::default(),
            || Event::Discovered(found("https://x/feed")),
            || Event::Refreshed(Refresh::RateLimited),
        );
        assert_eq!(effects[..2].to_vec(), vec![Effect::Continue, Effect::Discover]);
        assert_eq!(rec.state, LinkState::HasFeed);
        assert_eq!(rec.discovery_failures, 0);
    }

    #[test]
    fn test_discovery_attempts_cap() {
        let settings = UpdateSettings {
            max_discovery_attempts: Some(2),
            ..UpdateSettings::default()
        };

        let mut rec = record(LinkState::NoFeedFound, None);
        rec.discovery_failures = 2;
        let effects = run(&mut rec, &settings, || unreachable!(), || unreachable!());
        assert_eq!(effects, vec![Effect::Stop]);
        assert_eq!(rec.state, LinkState::NoFeedFound);

        // A transiently failing record runs out too
        let mut rec = record(LinkState::TransientError, None);
        rec.discovery_failures = 2;
        let effects = run(&mut rec, &settings, || unreachable!(), || unreachable!());
        assert_eq!(effects, vec![Effect::Continue, Effect::Stop]);
        assert_eq!(rec.state, LinkState::NoFeedFound);
    }

    #[test]
    fn test_capped_record_keeps_its_last_error() {
        let settings = UpdateSettings {
            max_discovery_attempts: Some(1),
            ..UpdateSettings::default()
        };
        let mut rec = record(LinkState::TransientError, None);
        rec.discovery_failures = 1;
        rec.last_error = Some(LinkError::transient("no feed link found"));

        run(&mut rec, &settings, || unreachable!(), || unreachable!());
        assert_eq!(rec.state, LinkState::NoFeedFound);
        assert_eq!(rec.last_error, Some(LinkError::transient("no feed link found")));

        // Stays put on later passes too
        run(&mut rec, &settings, || unreachable!(), || unreachable!());
        assert_eq!(rec.state, LinkState::NoFeedFound);
        assert!(rec.last_error.is_some());
    }

    #[test]
    fn test_error_cleared_once_an_attempt_runs() {
        let mut rec = record(LinkState::TransientError, Some("https://x/f.xml"));
        rec.last_error = Some(LinkError::transient("refused"));
        let settings = UpdateSettings::default();

        assert_eq!(apply(&mut rec, Event::Evaluate, &settings), Effect::Continue);
        assert!(rec.last_error.is_some());
        assert_eq!(apply(&mut rec, Event::Evaluate, &settings), Effect::Refresh);
        assert!(rec.last_error.is_none());
    }

    #[test]
    fn test_ignored_is_untouched() {
        let mut rec = record(LinkState::Ignored, Some("https://x/f.xml"));
        rec.last_error = Some(LinkError::permanent("old"));
        let before = serde_json::to_value(&rec).unwrap();

        let effects = run(
            &mut rec,
            &UpdateSettings::default(),
            || unreachable!(),
            || unreachable!(),
        );
        assert_eq!(effects, vec![Effect::Stop]);
        assert_eq!(serde_json::to_value(&rec).unwrap(), before);
    }

    #[test]
    fn test_successful_refresh_replaces_articles() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let mut rec = record(LinkState::HasFeed, Some("https://x/f.xml"));
        rec.articles = vec![Article {
            url: "https://x/old".into(),
            title: "Old".into(),
            published: None,
        }];
        let fresh = vec![Article {
            url: "https://x/new".into(),
            title: "New".into(),
            published: Some(t),
        }];

        let effect = apply(
            &mut rec,
            Event::Refreshed(Refresh::Fetched {
                articles: fresh.clone(),
                checked_at: t,
            }),
            &UpdateSettings::default(),
        );
        assert_eq!(effect, Effect::Stop);
        assert_eq!(rec.articles, fresh);
        assert_eq!(rec.last_checked, Some(t));
    }

    #[test]
    fn test_failed_refresh_keeps_articles() {
        let mut rec = record(LinkState::HasFeed, Some("https://x/f.xml"));
        rec.articles = vec![Article {
            url: "https://x/old".into(),
            title: "Old".into(),
            published: None,
        }];
        let before = rec.articles.clone();

        apply(
            &mut rec,
            Event::RefreshFailed(LinkError::permanent("mismatched closing tag")),
            &UpdateSettings::default(),
        );
        assert_eq!(rec.state, LinkState::TransientError);
        assert_eq!(rec.articles, before);
        assert_eq!(rec.feed_url(), Some("https://x/f.xml"));
    }

    #[test]
    fn test_has_feed_without_url_rediscovers() {
        let mut rec = record(LinkState::HasFeed, Some(""));
        let effects = run(
            &mut rec,
            &UpdateSettings::default(),
            || Event::Discovered(found("https://x/feed")),
            || Event::Refreshed(Refresh::RateLimited),
        );
        assert_eq!(effects[..2].to_vec(), vec![Effect::Continue, Effect::Discover]);
        assert_eq!(rec.feed_url(), Some("https://x/feed"));
    }

    #[tokio::test]
    async fn test_transient_recovery_without_rediscovery() {
        let client = reqwest::Client::new();
        let settings = UpdateSettings::default();
        let mut rec = record(LinkState::HasFeed, Some("http://127.0.0.1:1/f.xml"));

        process(&client, &mut rec, &settings).await;
        assert_eq!(rec.state, LinkState::TransientError);
        assert!(rec.last_error.as_ref().unwrap().is_transient());
        assert_eq!(rec.feed_url(), Some("http://127.0.0.1:1/f.xml"));

        // Next pass goes straight back to refreshing
        let effect = apply(&mut rec, Event::Evaluate, &settings);
        assert_eq!(effect, Effect::Continue);
        assert_eq!(rec.state, LinkState::HasFeed);
        assert_eq!(rec.feed_url(), Some("http://127.0.0.1:1/f.xml"));
        assert_eq!(apply(&mut rec, Event::Evaluate, &settings), Effect::Refresh);
    }

    #[tokio::test]
    async fn test_process_new_link_end_to_end() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<html><body><a href="/rss.xml">RSS</a></body></html>"#)
                    .insert_header("Content-Type", "text/html"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rss.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(
                        "<rss><channel><item><title>Hi</title><link>/hi</link>\
                         <pubDate>Mon, 02 Jan 2006 15:04:05 GMT</pubDate></item></channel></rss>",
                    )
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let mut rec = LinkRecord::new(format!("{}/", server.uri()), "Blog");
        process(&client, &mut rec, &UpdateSettings::default()).await;

        assert_eq!(rec.state, LinkState::HasFeed);
        assert_eq!(rec.feed_url(), Some(format!("{}/rss.xml", server.uri()).as_str()));
        assert_eq!(rec.articles.len(), 1);
        assert_eq!(rec.articles[0].url, format!("{}/hi", server.uri()));
        assert!(rec.last_checked.is_some());
        assert!(rec.last_error.is_none());
    }
}
