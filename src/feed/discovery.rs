use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::collections::HashSet;

use crate::error::LinkError;
use crate::feed::fetcher::read_limited_bytes;
use crate::feed::parser::detect_format;
use crate::links::{Link, Page};
use crate::util::force_absolute;

/// Case-insensitive substrings of a link title that suggest a feed.
const FEED_TITLE_HINTS: &[&str] = &["rss", "atom", "feed"];

/// Case-insensitive URL endings that suggest a feed.
const FEED_URL_SUFFIXES: &[&str] = &[
    "atom.xml",
    "rss.xml",
    "feed.xml",
    "feed=rss2",
    "feed=atom",
    "feed=rss",
    "feed",
];

/// Content-Type prefixes a feed may be served with.
const FEED_CONTENT_TYPES: &[&str] = &[
    "text/xml",
    "text/plain",
    "application/xml",
    "application/rss+xml",
    "application/atom+xml",
];

/// A feed found behind a bookmarked page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFeed {
    /// Absolute URL of the RSS/Atom/RDF document
    pub feed_url: String,
    /// `<title>` of the bookmarked page, if it had one
    pub page_title: Option<String>,
}

/// Finds the feed published by the page at `base_url`.
///
/// Fetches the page and, if the page is not itself a feed, probes every
/// on-page link that looks like one (see [`looks_like_feed_link`]) in
/// document order. The first candidate that answers 200 with a feed
/// Content-Type and a feed root element wins.
///
/// # Errors
///
/// - Transient: connection failure, 5xx, or no candidate confirmed (the
///   site may add a feed later)
/// - Permanent: any other non-200 status for the page itself, or a body
///   over `max_body_bytes`
///
/// Failures while probing individual candidates are logged and skipped.
pub async fn discover_feed(
    client: &reqwest::Client,
    base_url: &str,
    title: &str,
    max_body_bytes: usize,
) -> Result<DiscoveredFeed, LinkError> {
    tracing::info!(link = %title, url = %base_url, "Looking for feed");

    let response = client
        .get(base_url)
        .send()
        .await
        .map_err(|e| LinkError::transient(format!("find feed: {e}")))?;

    let status = response.status();
    if status.is_server_error() {
        return Err(LinkError::transient(format!("find feed: server error {status}")));
    }
    if status != StatusCode::OK {
        return Err(LinkError::permanent(format!(
            "Error {} reading {base_url}",
            status.as_u16()
        )));
    }

    let is_feed_type = has_feed_content_type(&response);
    let bytes = read_limited_bytes(response, max_body_bytes).await?;

    // Bookmark pointing straight at a feed
    if is_feed_type && detect_format(&bytes).is_some() {
        tracing::debug!(link = %title, "Bookmark is itself a feed");
        return Ok(DiscoveredFeed {
            feed_url: force_absolute(base_url, base_url)?,
            page_title: None,
        });
    }

    let page = Page::parse(&String::from_utf8_lossy(&bytes));
    let mut probed = HashSet::new();

    for link in page.links.iter().filter(|l| looks_like_feed_link(l)) {
        let candidate = match force_absolute(base_url, &link.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!(link = %title, href = %link.url, error = %e, "Skipping unresolvable candidate");
                continue;
            }
        };
        if !probed.insert(candidate.clone()) {
            continue;
        }
        if probe_candidate(client, &candidate, max_body_bytes).await {
            tracing::info!(link = %title, feed = %candidate, "Found feed");
            return Ok(DiscoveredFeed {
                feed_url: candidate,
                page_title: page.title,
            });
        }
    }

    Err(LinkError::transient(format!(
        "find feed: no feed link found in main page for {title}"
    )))
}

/// Cheap, network-free ranking: does this link look like it leads to a feed?
///
/// Either heuristic suffices: a title containing "rss", "atom" or "feed",
/// or a URL ending in one of the well-known feed suffixes.
pub fn looks_like_feed_link(link: &Link) -> bool {
    let title = link.title.to_lowercase();
    if FEED_TITLE_HINTS.iter().any(|hint| title.contains(hint)) {
        return true;
    }

    let url = link.url.to_lowercase();
    FEED_URL_SUFFIXES.iter().any(|suffix| url.ends_with(suffix))
}

/// True if `content_type` starts with one of the accepted feed MIME types.
pub fn is_feed_content_type(content_type: &str) -> bool {
    let content_type = content_type.trim().to_lowercase();
    FEED_CONTENT_TYPES
        .iter()
        .any(|prefix| content_type.starts_with(prefix))
}

fn has_feed_content_type(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get_all(CONTENT_TYPE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(is_feed_content_type)
}

/// Fetches one candidate and checks both its Content-Type and its root
/// element. Every failure just means "not this one".
async fn probe_candidate(client: &reqwest::Client, url: &str, max_body_bytes: usize) -> bool {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(candidate = %url, error = %e, "Candidate fetch failed");
            return false;
        }
    };

    if response.status() != StatusCode::OK {
        tracing::debug!(candidate = %url, status = %response.status(), "Candidate rejected");
        return false;
    }
    if !has_feed_content_type(&response) {
        tracing::debug!(candidate = %url, "Candidate has non-feed Content-Type");
        return false;
    }

    match read_limited_bytes(response, max_body_bytes).await {
        Ok(bytes) => detect_format(&bytes).is_some(),
        Err(e) => {
            tracing::debug!(candidate = %url, error = %e, "Candidate body unreadable");
            false
        }
    }
}
