//! Sitemap URL extraction.
//!
//! Sitemaps in the wild disagree on XML namespaces, so `<loc>` entries are
//! pulled out with a namespace-agnostic pattern instead of a strict XML
//! parse.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

static LOC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:[\w-]+:)?loc[^>]*>\s*(.*?)\s*</(?:[\w-]+:)?loc>").expect("loc regex")
});

/// Extract every `<loc>` URL from sitemap XML, in document order.
///
/// Entries that fail URL parsing are dropped. Returns an empty list for
/// XML with no locations.
pub fn extract_sitemap_urls(xml: &str) -> Vec<Url> {
    let urls: Vec<Url> = LOC_RE
        .captures_iter(xml)
        .filter_map(|cap| Url::parse(cap[1].trim()).ok())
        .collect();

    debug!(count = urls.len(), "extracted sitemap URLs");
    urls
}
