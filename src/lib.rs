//! Finds the feeds behind bookmarked pages and tracks what they publish.
//!
//! The flow for one run:
//!
//! 1. [`links::extract_links`] pulls `{url, title}` pairs from a bookmark file
//! 2. [`store::LinkStore::interested_in`] notes each one
//! 3. [`store::LinkStore::check_for_updates`] discovers feeds and refreshes
//!    articles across a bounded worker pool
//! 4. [`report::render`] prints unread articles and marks them read

pub mod config;
pub mod error;
pub mod feed;
pub mod links;
pub mod report;
pub mod store;
pub mod util;

pub use error::{ErrorKind, LinkError};
