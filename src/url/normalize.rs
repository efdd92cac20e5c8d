use crate::UrlError;
use url::Url;

/// Canonicalizes a product URL into its stable identity key
///
/// # Canonicalization Steps
///
/// 1. Parse the URL (relative links are resolved against `base` when given)
/// 2. Reject anything that is not HTTP or HTTPS
/// 3. Lowercase the host (done by the parser)
/// 4. Remove the query string
/// 5. Remove the fragment
///
/// Canonicalization is idempotent: feeding the output back in yields the same
/// URL, and two URLs that differ only in their query string map to the same key.
///
/// # Examples
///
/// ```
/// use aisle_sweep::url::canonicalize;
///
/// let a = canonicalize("https://www.homedepot.com/p/x/100?ref=1", None).unwrap();
/// let b = canonicalize("https://www.homedepot.com/p/x/100?ref=2", None).unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "https://www.homedepot.com/p/x/100");
/// ```
pub fn canonicalize(raw: &str, base: Option<&Url>) -> Result<Url, UrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Parse("empty URL".to_string()));
    }

    let mut url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(base) => base
                .join(trimmed)
                .map_err(|e| UrlError::Parse(e.to_string()))?,
            None => return Err(UrlError::Parse(format!("relative URL: {}", trimmed))),
        },
        Err(e) => return Err(UrlError::Parse(e.to_string())),
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

/// Returns the last non-empty path segment of a URL
///
/// Product URLs for both supported retailers end in the item id
/// (`/p/<slug>/<id>` and `/pd/<slug>/<id>`).
pub fn last_path_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(|segment| segment.to_string())
}
