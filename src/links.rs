//! Link extraction from HTML.
//!
//! Used twice: once on the user's bookmark file, and again by feed
//! discovery on every fetched page. Both want the same thing, an ordered
//! list of `{url, title}` pairs pulled from `<a>` and `<link>` elements.
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

use crate::util::normalize_title;

/// Title given to a `<link>` element without a `type` attribute.
const UNTYPED_LINK_TITLE: &str = "Some Link";

/// A hyperlink found in an HTML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// The raw `href` value, possibly relative to the page.
    pub url: String,
    /// Anchor text for `<a>`, the `type` attribute for `<link>`.
    pub title: String,
}

impl Link {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

/// What discovery needs from a fetched page, pulled out in a single parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub title: Option<String>,
    pub links: Vec<Link>,
}

impl Page {
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);
        Self {
            title: page_title(&document),
            links: links_in(&document),
        }
    }
}

fn link_selector() -> Option<&'static Selector> {
    static SELECTOR: OnceLock<Option<Selector>> = OnceLock::new();
    SELECTOR
        .get_or_init(|| Selector::parse("a[href], link[href]").ok())
        .as_ref()
}

fn title_selector() -> Option<&'static Selector> {
    static SELECTOR: OnceLock<Option<Selector>> = OnceLock::new();
    SELECTOR
        .get_or_init(|| Selector::parse("title").ok())
        .as_ref()
}

/// Extracts every `<a href>` and `<link href>` from `html`, in document order.
///
/// - `<a>`: the title is the element's text (nested markup flattened); if
///   that is empty, the `title` attribute; if that is also empty, the
///   anchor is skipped.
/// - `<link>`: the title is the `type` attribute (so
///   `type="application/rss+xml"` looks like a feed), or `"Some Link"`.
///
/// Never fails: html5ever recovers from any malformed input.
pub fn extract_links(html: &str) -> Vec<Link> {
    links_in(&Html::parse_document(html))
}

fn links_in(document: &Html) -> Vec<Link> {
    let Some(selector) = link_selector() else {
        return Vec::new();
    };

    document
        .select(selector)
        .filter_map(|element| {
            let href = element.value().attr("href")?.trim();
            if href.is_empty() {
                return None;
            }
            let title = match element.value().name() {
                "link" => element
                    .value()
                    .attr("type")
                    .map(normalize_title)
                    .unwrap_or_else(|| UNTYPED_LINK_TITLE.to_owned()),
                _ => anchor_title(&element)?,
            };
            Some(Link::new(href, title))
        })
        .collect()
}

fn anchor_title(element: &ElementRef<'_>) -> Option<String> {
    let text = normalize_title(&element.text().collect::<String>());
    if !text.is_empty() {
        return Some(text);
    }
    element
        .value()
        .attr("title")
        .map(normalize_title)
        .filter(|t| !t.is_empty())
}

/// Returns the document's `<title>` text, if it has a non-empty one.
pub fn extract_page_title(html: &str) -> Option<String> {
    page_title(&Html::parse_document(html))
}

fn page_title(document: &Html) -> Option<String> {
    let title = document.select(title_selector()?).next()?;
    Some(normalize_title(&title.text().collect::<String>())).filter(|t| !t.is_empty())
}
