use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::LinkError;
use crate::store::Article;
use crate::util::normalize_title;

/// Feed dialects we know how to read.
///
/// All three share one extraction routine: their per-item shape is close
/// enough that only the `<link>` handling differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    /// RSS 0.9x / 2.0, root `<rss>`
    Rss,
    /// Atom 1.0, root `<feed>`
    Atom,
    /// RSS 1.0, root `<rdf:RDF>`
    Rdf,
}

impl FeedFormat {
    /// Classifies a root element by its local (prefix-free) name.
    pub fn from_root(local_name: &[u8]) -> Option<Self> {
        match local_name {
            b"rss" => Some(FeedFormat::Rss),
            b"feed" => Some(FeedFormat::Atom),
            b"RDF" => Some(FeedFormat::Rdf),
            _ => None,
        }
    }
}

/// Returns the format of `bytes` if its first element is a known feed root.
pub fn detect_format(bytes: &[u8]) -> Option<FeedFormat> {
    FeedParser::open(bytes).ok().flatten().map(|p| p.format())
}

/// Streaming article extractor positioned just past a feed's root element.
pub struct FeedParser<'a> {
    reader: Reader<&'a [u8]>,
    format: FeedFormat,
}

impl<'a> FeedParser<'a> {
    /// Reads up to the first start element and classifies it.
    ///
    /// Returns `Ok(None)` when the document is well-formed so far but the
    /// root is not a feed (an HTML page, say).
    ///
    /// # Errors
    ///
    /// A permanent [`LinkError`] if the XML is broken before the first
    /// element or the document has no elements at all.
    pub fn open(bytes: &'a [u8]) -> Result<Option<Self>, LinkError> {
        let mut reader = Reader::from_reader(bytes);
        // Item termination is checked by nesting depth in `read_article`.
        // Text is left untrimmed so spacing around CDATA and inline markup
        // survives into titles.
        reader.config_mut().check_end_names = false;

        loop {
            match reader.read_event()? {
                Event::Start(root) | Event::Empty(root) => {
                    return Ok(FeedFormat::from_root(root.local_name().as_ref())
                        .map(|format| FeedParser { reader, format }));
                }
                Event::Eof => return Err(LinkError::permanent("no start element found")),
                _ => {}
            }
        }
    }

    pub fn format(&self) -> FeedFormat {
        self.format
    }

    /// Extracts every `<item>` (RSS, RDF) or `<entry>` (Atom) in document order.
    ///
    /// Channel structure is ignored; items are collected wherever they sit.
    /// A self-closing `<item/>` yields an empty article. Any bad item fails
    /// the whole feed.
    pub fn articles(mut self) -> Result<Vec<Article>, LinkError> {
        let mut articles = Vec::new();

        loop {
            match self.reader.read_event()? {
                Event::Start(e) if is_item(&e) => {
                    let is_atom = e.local_name().as_ref() == b"entry";
                    articles.push(self.read_article(is_atom)?);
                }
                Event::Empty(e) if is_item(&e) => articles.push(Article {
                    url: String::new(),
                    title: String::new(),
                    published: None,
                }),
                Event::Eof => return Ok(articles),
                _ => {}
            }
        }
    }

    fn read_article(&mut self, is_atom: bool) -> Result<Article, LinkError> {
        let closing: &[u8] = if is_atom { b"entry" } else { b"item" };
        let mut depth: usize = 0;
        let mut accum = String::new();
        let mut title = String::new();
        let mut url: Option<String> = None;
        let mut url_is_alternate = false;
        let mut published: Option<DateTime<Utc>> = None;

        loop {
            match self.reader.read_event()? {
                Event::Start(e) => {
                    depth += 1;
                    accum.clear();
                    if is_atom && e.local_name().as_ref() == b"link" {
                        self.take_atom_link(&e, &mut url, &mut url_is_alternate)?;
                    }
                }
                Event::Empty(e) => {
                    accum.clear();
                    if is_atom && e.local_name().as_ref() == b"link" {
                        self.take_atom_link(&e, &mut url, &mut url_is_alternate)?;
                    }
                }
                Event::End(e) => {
                    let name = e.local_name();
                    if depth == 0 {
                        if name.as_ref() == closing {
                            break;
                        }
                        return Err(LinkError::permanent(format!(
                            "mismatched closing tag </{}> inside <{}>",
                            String::from_utf8_lossy(name.as_ref()),
                            String::from_utf8_lossy(closing),
                        )));
                    }
                    depth -= 1;

                    match name.as_ref() {
                        // Some feeds repeat <title> under another namespace
                        // (media:title). Every occurrence is appended.
                        b"title" => title.push_str(&accum),
                        b"link" if !is_atom => url = Some(accum.trim().to_owned()),
                        b"pubDate" | b"updated" | b"date" if published.is_none() => {
                            published = Some(parse_time(&accum)?);
                        }
                        _ => {}
                    }
                }
                Event::Text(t) => match t.unescape() {
                    Ok(text) => accum.push_str(&text),
                    // Undeclared HTML entities (&nbsp;) are common; keep the raw text
                    Err(_) => accum.push_str(&String::from_utf8_lossy(&t)),
                },
                Event::CData(t) => accum.push_str(&String::from_utf8_lossy(&t.into_inner())),
                Event::Eof => {
                    return Err(LinkError::permanent(format!(
                        "feed ended inside <{}>",
                        String::from_utf8_lossy(closing)
                    )))
                }
                _ => {}
            }
        }

        Ok(Article {
            url: url.unwrap_or_default(),
            title: normalize_title(&title),
            published,
        })
    }

    /// Atom links carry the URL in `href`. The first `rel="alternate"` (or
    /// rel-less) link wins over enclosures, replies and the like.
    fn take_atom_link(
        &self,
        e: &BytesStart<'_>,
        url: &mut Option<String>,
        url_is_alternate: &mut bool,
    ) -> Result<(), LinkError> {
        let decoder = self.reader.decoder();
        let mut href = None;
        let mut alternate = true;

        for attr in e.attributes() {
            let attr = attr.map_err(|e| LinkError::permanent(format!("bad attribute: {e}")))?;
            match attr.key.local_name().as_ref() {
                b"href" => href = Some(attr.decode_and_unescape_value(decoder)?.into_owned()),
                b"rel" => alternate = attr.decode_and_unescape_value(decoder)? == "alternate",
                _ => {}
            }
        }

        let href = href
            .ok_or_else(|| LinkError::permanent("could not find href attribute for entry link"))?;
        if url.is_none() || (alternate && !*url_is_alternate) {
            *url = Some(href.trim().to_owned());
            *url_is_alternate = alternate;
        }
        Ok(())
    }
}

fn is_item(e: &BytesStart<'_>) -> bool {
    matches!(e.local_name().as_ref(), b"item" | b"entry")
}

/// Parses a feed timestamp.
///
/// The RSS spec says RFC 822, but real feeds also use RFC 3339 and bare
/// dates, so formats are tried in order:
///
/// 1. RFC 822 / RFC 1123, with a named or numeric zone
/// 2. The same with an unrecognized zone abbreviation, read as UTC
/// 3. RFC 3339
/// 4. `YYYY-M-D`, as midnight UTC
pub fn parse_time(text: &str) -> Result<DateTime<Utc>, LinkError> {
    let text = text.trim();

    if let Ok(t) = DateTime::parse_from_rfc2822(text) {
        return Ok(t.with_timezone(&Utc));
    }

    if let Some((head, zone)) = text.rsplit_once(' ') {
        if (2..=5).contains(&zone.len()) && zone.chars().all(|c| c.is_ascii_alphabetic()) {
            if let Ok(t) = DateTime::parse_from_rfc2822(&format!("{head} +0000")) {
                return Ok(t.with_timezone(&Utc));
            }
        }
    }

    if let Ok(t) = DateTime::parse_from_rfc3339(text) {
        return Ok(t.with_timezone(&Utc));
    }

    if let Some(midnight) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }

    Err(LinkError::permanent(format!("could not parse time: {text}")))
}
