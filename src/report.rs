//! HTML report of unread articles and link errors.
use quick_xml::escape::escape;
use std::fmt::Write;

use crate::store::{LinkRecord, LinkState, LinkStore};
use crate::util::strip_control_chars;

/// Renders the report for every noted link, in the order they were noted.
///
/// A link without a usable feed shows its last error, if any. A link with a
/// feed shows its unread articles, oldest first, and unless `keep_unread`
/// is set those articles are then marked read.
pub fn render(store: &mut LinkStore, keep_unread: bool) -> String {
    let mut out = String::new();
    let noted = store.noted().to_vec();

    for url in &noted {
        let Some(record) = store.get_mut(url) else {
            continue;
        };
        if render_link(&mut out, record) && !keep_unread {
            record.mark_all_as_read();
        }
    }
    out
}

/// Appends one link's section. Returns true if unread articles were shown.
fn render_link(out: &mut String, record: &LinkRecord) -> bool {
    if record.state != LinkState::HasFeed {
        if let Some(err) = &record.last_error {
            let _ = writeln!(out, "<h1>{}</h1>", clean(&record.title));
            let _ = writeln!(out, "<i>ERROR: {}</i>", clean(&err.to_string()));
        }
        return false;
    }

    let unread = record.unread_articles();
    if unread.is_empty() {
        return false;
    }

    let _ = writeln!(out, "<h1>{}</h1>", clean(&record.title));
    out.push_str("<ul>\n");
    for article in unread {
        let _ = writeln!(
            out,
            "<li><a href='{}'>{}</a>",
            clean(&article.url),
            clean(&article.title)
        );
    }
    out.push_str("</ul>\n");
    true
}

fn clean(s: &str) -> String {
    escape(strip_control_chars(s).as_ref()).into_owned()
}
