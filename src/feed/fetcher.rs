use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::StatusCode;
use std::time::Duration;

use crate::error::LinkError;
use crate::feed::parser::FeedParser;
use crate::store::{Article, LinkRecord};
use crate::util::force_absolute;

/// What an article refresh did, when it didn't fail.
#[derive(Debug, Clone, PartialEq)]
pub enum Refresh {
    /// Checked too recently; nothing fetched.
    RateLimited,
    /// Fetched, but the document root is not a feed we can read.
    UnknownFormat,
    /// Fresh article list, oldest first, with absolute URLs.
    Fetched {
        articles: Vec<Article>,
        checked_at: DateTime<Utc>,
    },
}

/// Fetches and parses the record's feed.
///
/// Does not touch the record: the caller decides what to do with the
/// outcome. The returned list replaces, rather than merges with, the
/// previous one.
///
/// # Behavior
///
/// - Skips the fetch if the last successful check was less than
///   `min_interval` ago
/// - Non-200 responses and network errors are transient
/// - Parse errors and unresolvable article URLs are permanent and discard
///   the whole batch; no partial article lists are ever returned
/// - An unrecognized document root yields [`Refresh::UnknownFormat`],
///   which is not an error
pub async fn refresh_articles(
    client: &reqwest::Client,
    record: &LinkRecord,
    min_interval: Duration,
    max_body_bytes: usize,
) -> Result<Refresh, LinkError> {
    tracing::info!(link = %record.title, "Checking for articles");

    let now = Utc::now();
    if let Some(last_checked) = record.last_checked {
        let too_soon = now
            .signed_duration_since(last_checked)
            .to_std()
            .map_or(true, |elapsed| elapsed < min_interval);
        if too_soon {
            tracing::debug!(
                link = %record.title,
                min_interval_secs = min_interval.as_secs(),
                "Checked recently, skipping"
            );
            return Ok(Refresh::RateLimited);
        }
    }

    let feed_url = record
        .feed_url()
        .ok_or_else(|| LinkError::permanent("no feed URL recorded"))?;
    let bytes = fetch_feed(client, &record.base_url, feed_url, max_body_bytes).await?;

    let Some(parser) = FeedParser::open(&bytes)? else {
        tracing::warn!(link = %record.title, feed = %feed_url, "Unrecognized feed format, ignoring");
        return Ok(Refresh::UnknownFormat);
    };
    let format = parser.format();
    let articles = finish_articles(parser.articles()?, &record.base_url)?;

    tracing::debug!(
        link = %record.title,
        ?format,
        articles = articles.len(),
        "Feed parsed"
    );

    Ok(Refresh::Fetched {
        articles,
        checked_at: now,
    })
}

/// Sorts oldest first and resolves every URL against `base_url`.
///
/// One bad URL fails the batch.
pub fn finish_articles(
    mut articles: Vec<Article>,
    base_url: &str,
) -> Result<Vec<Article>, LinkError> {
    articles.sort_by(|a, b| a.published.cmp(&b.published));
    for article in &mut articles {
        article.url = force_absolute(base_url, &article.url)?;
    }
    Ok(articles)
}

/// GETs `url` (resolved against `base_url`) and returns the body of a 200.
pub(crate) async fn fetch_feed(
    client: &reqwest::Client,
    base_url: &str,
    url: &str,
    max_body_bytes: usize,
) -> Result<Vec<u8>, LinkError> {
    let absolute = force_absolute(base_url, url)?;
    let response = client.get(&absolute).send().await?;

    if response.status() != StatusCode::OK {
        return Err(LinkError::transient(format!(
            "bad response from {absolute}: {}",
            response.status()
        )));
    }

    read_limited_bytes(response, max_body_bytes).await
}

/// Reads a response body, refusing anything over `limit` bytes.
pub(crate) async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, LinkError> {
    let too_large = || LinkError::permanent(format!("response larger than {limit} bytes"));

    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(too_large());
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(too_large());
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
