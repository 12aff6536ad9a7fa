use crate::error::LinkError;
use url::Url;

/// Resolves `maybe_relative` against `base`, returning an absolute URL.
///
/// Absolute inputs come back exactly as given, minus surrounding
/// whitespace. Failure to parse either side is a permanent error: retrying
/// will not fix a malformed URL.
///
/// # Examples
///
/// ```
/// use markfeed::util::force_absolute;
///
/// let abs = force_absolute("https://example.com/blog/", "feed.xml").unwrap();
/// assert_eq!(abs, "https://example.com/blog/feed.xml");
/// ```
pub fn force_absolute(base: &str, maybe_relative: &str) -> Result<String, LinkError> {
    let maybe_relative = maybe_relative.trim();
    if Url::parse(maybe_relative).is_ok() {
        return Ok(maybe_relative.to_owned());
    }

    let base = Url::parse(base)
        .map_err(|e| LinkError::permanent(format!("invalid base URL {base}: {e}")))?;
    let resolved = base
        .join(maybe_relative)
        .map_err(|e| LinkError::permanent(format!("cannot resolve {maybe_relative}: {e}")))?;
    Ok(resolved.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_relative_path() {
        assert_eq!(
            force_absolute("https://example.com/page", "/feed.xml").unwrap(),
            "https://example.com/feed.xml"
        );
        assert_eq!(
            force_absolute("https://example.com/blog/", "rss.xml").unwrap(),
            "https://example.com/blog/rss.xml"
        );
    }

    #[test]
    fn test_protocol_relative() {
        assert_eq!(
            force_absolute("https://example.com", "//cdn.example.com/feed").unwrap(),
            "https://cdn.example.com/feed"
        );
    }

    #[test]
    fn test_absolute_passthrough() {
        assert_eq!(
            force_absolute("https://example.com", "https://other.com/a?b=1").unwrap(),
            "https://other.com/a?b=1"
        );
    }

    #[test]
    fn test_absolute_input_is_not_normalized() {
        for url in [
            "https://example.com",
            "https://Example.COM/Feed",
            "http://e.com:80/a",
        ] {
            assert_eq!(force_absolute("https://base.example/", url).unwrap(), url);
        }
        assert_eq!(
            force_absolute("https://base.example/", "  https://example.com\n").unwrap(),
            "https://example.com"
        );
    }

    #[test]
    fn test_query_only() {
        assert_eq!(
            force_absolute("https://example.com/blog/", "?feed=rss2").unwrap(),
            "https://example.com/blog/?feed=rss2"
        );
    }

    #[test]
    fn test_bad_base_is_permanent() {
        let err = force_absolute("not a base", "/feed.xml").unwrap_err();
        assert!(!err.is_transient());
    }

    proptest! {
        #[test]
        fn prop_absolute_url_roundtrips(
            scheme in "(http|https|HTTP)",
            host in "[a-zA-Z]{1,12}\\.(com|org|NET)",
            port in proptest::option::of(prop_oneof![Just(80u16), Just(443u16), 1024u16..9000]),
            path in "(/[a-zA-Z0-9_-]{1,8}){0,4}",
        ) {
            let port = port.map(|p| format!(":{p}")).unwrap_or_default();
            let url = format!("{scheme}://{host}{port}{path}");
            prop_assert_eq!(force_absolute("https://base.example/x/", &url).unwrap(), url.clone());
            prop_assert_eq!(force_absolute(&url, &url).unwrap(), url);
        }
    }
}
