//! Everything that talks to a feed: finding one, fetching it, parsing it.
//!
//! - [`discovery`] - locate the feed behind a bookmarked page
//! - [`fetcher`] - rate-limited article refresh for a known feed URL
//! - [`parser`] - streaming RSS 2.0 / Atom / RDF reader built on `quick-xml`
//!
//! None of these mutate a [`LinkRecord`](crate::store::LinkRecord); they
//! return outcomes that the lifecycle in [`crate::store`] applies.

pub mod discovery;
pub mod fetcher;
pub mod parser;

pub use discovery::{discover_feed, DiscoveredFeed};
pub use fetcher::{refresh_articles, Refresh};
pub use parser::{detect_format, parse_time, FeedFormat, FeedParser};
