//! Node URL normalization and order prefixes.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Order prefix and remaining title of a path segment, i.e. `06_Foo`.
static PATH_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0?(\d+)[_,-]+(.*)$").expect("valid regex"));

static INVALID_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^A-Za-z0-9\-_]").expect("valid regex"));

static MULTIPLE_DASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("valid regex"));

/// Characters ignored when looking up a URL, so `foo/bar baz` and
/// `foo/barbaz` are equal.
static LOOKUP_IGNORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-_]+").expect("valid regex"));

/// Compose decomposed characters; some filesystems store names decomposed.
#[must_use]
pub fn nfc(s: &str) -> String {
    s.nfc().collect()
}

/// The order number embedded in a path segment, 0 if there is none.
#[must_use]
pub fn order_number(segment: &str) -> u64 {
    PATH_TITLE
        .captures(segment)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Strip the order prefix from a path segment, if present.
#[must_use]
pub fn remove_order_number(segment: &str) -> String {
    match PATH_TITLE.captures(segment).and_then(|c| c.get(2)) {
        Some(m) => m.as_str().to_string(),
        None => segment.to_string(),
    }
}

/// Prettify a relative node URL. Idempotent.
///
/// ```text
/// /foo/bar/  -> foo/bar
/// foo/02_bar -> foo/bar
/// ```
#[must_use]
pub fn normalize_node_url(url: &str) -> String {
    url.split('/')
        .filter_map(|segment| {
            let p = remove_order_number(&nfc(segment));
            let p = deunicode::deunicode(&p);
            let p = INVALID_CHARS.replace_all(&p, "-");
            let p = MULTIPLE_DASHES.replace_all(&p, "-");
            let p = p.trim_matches('-');
            (!p.is_empty()).then(|| p.to_string())
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Lower-cased, separator-free form of a node URL, used as lookup key.
#[must_use]
pub fn lookup_node_url(url: &str) -> String {
    LOOKUP_IGNORE
        .replace_all(&normalize_node_url(url).to_lowercase(), "")
        .into_owned()
}

/// Join URL path parts with single slashes, leaving out empty parts.
pub(crate) fn join_url_path<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for part in parts {
        let trimmed = part.trim_matches('/');
        if trimmed.is_empty() {
            if out.is_empty() && part.starts_with('/') {
                out.push('/');
            }
            continue;
        }
        if !out.is_empty() && !out.ends_with('/') {
            out.push('/');
        }
        if out.is_empty() && part.starts_with('/') {
            out.push('/');
        }
        out.push_str(trimmed);
    }
    out
}
