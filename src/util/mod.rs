//! Utility functions for common operations.
//!
//! - **URL resolution**: turning page-relative hrefs into absolute URLs
//! - **Text processing**: sanitizing untrusted titles

mod resolve;
mod text;

pub use resolve::force_absolute;
pub use text::{normalize_title, strip_control_chars};
