//! Page fetching and HTML-to-markdown extraction.

use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use ragforge_shared::{RagForgeError, Result};

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("RagForge/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout. The overall crawl deadline is enforced separately
/// by the engine.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A fetched page converted to markdown.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// The URL that was fetched.
    pub url: Url,
    /// Page title (first `<h1>`, falling back to `<title>`).
    pub title: Option<String>,
    /// Main content rendered as markdown.
    pub markdown: String,
    /// Same-document links, resolved against the page URL with fragments
    /// stripped.
    pub links: Vec<Url>,
}

/// The fetch capability seam: swap in a mock for tests, the real HTTP
/// client in production.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch an HTML page, extract links, and convert it to markdown.
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage>;

    /// Fetch raw text (plain files, sitemaps) without HTML processing.
    async fn fetch_text(&self, url: &Url) -> Result<String>;
}

/// HTTP fetcher backed by a shared reqwest client.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RagForgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    async fn get_body(&self, url: &Url) -> Result<String> {
        debug!(%url, "fetching");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| RagForgeError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagForgeError::Network(format!("{url}: HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| RagForgeError::Network(format!("{url}: body read failed: {e}")))
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage> {
        let body = self.get_body(url).await?;
        Ok(extract(url, &body))
    }

    async fn fetch_text(&self, url: &Url) -> Result<String> {
        self.get_body(url).await
    }
}

/// Parse HTML and produce the page's title, links, and markdown.
///
/// Synchronous on purpose: `scraper::Html` is not `Send` and must not be
/// held across an await point.
fn extract(url: &Url, body: &str) -> FetchedPage {
    let doc = Html::parse_document(body);

    let title = extract_title(&doc);
    let links = extract_links(&doc, url);
    drop(doc);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "nav", "iframe", "noscript", "svg"])
        .build();
    // Pages that defeat the converter still flow through as raw text
    // rather than killing the whole crawl.
    let markdown = converter.convert(body).unwrap_or_else(|_| body.to_string());

    FetchedPage {
        url: url.clone(),
        title,
        markdown,
        links,
    }
}

fn extract_title(doc: &Html) -> Option<String> {
    for selector in ["h1", "title"] {
        let sel = Selector::parse(selector).ok()?;
        if let Some(el) = doc.select(&sel).next() {
            let text = el.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Extract all links, resolved against the base URL with fragments
/// stripped so `/page#a` and `/page#b` dedupe to one crawl target.
fn extract_links(doc: &Html, base_url: &Url) -> Vec<Url> {
    let Ok(link_sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links = Vec::new();
    for el in doc.select(&link_sel) {
        if let Some(href) = el.value().attr("href") {
            if href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
            {
                continue;
            }

            if let Ok(mut resolved) = base_url.join(href) {
                resolved.set_fragment(None);
                links.push(resolved);
            }
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn links_resolved_and_fragments_stripped() {
        let html = r##"<html><body>
            <a href="/page2">Page 2</a>
            <a href="relative/path">Relative</a>
            <a href="/page2#section">Same page, anchor</a>
            <a href="#local">Anchor only</a>
            <a href="javascript:void(0)">JS</a>
            <a href="mailto:a@b.c">Mail</a>
        </body></html>"##;

        let doc = Html::parse_document(html);
        let base = Url::parse("https://docs.example.com/page1").unwrap();
        let links = extract_links(&doc, &base);

        let strings: Vec<String> = links.iter().map(|u| u.to_string()).collect();
        assert!(strings.contains(&"https://docs.example.com/page2".to_string()));
        assert!(strings.contains(&"https://docs.example.com/relative/path".to_string()));
        assert!(!strings.iter().any(|l| l.contains('#')));
        // The anchored variant collapses onto the plain /page2 link.
        assert_eq!(strings.iter().filter(|l| l.ends_with("/page2")).count(), 2);
    }

    #[test]
    fn title_prefers_h1_over_title_tag() {
        let html = "<html><head><title>Tab Title</title></head>\
                    <body><h1>Main Heading</h1></body></html>";
        let doc = Html::parse_document(html);
        assert_eq!(extract_title(&doc), Some("Main Heading".to_string()));

        let html = "<html><head><title>Tab Title</title></head><body></body></html>";
        let doc = Html::parse_document(html);
        assert_eq!(extract_title(&doc), Some("Tab Title".to_string()));
    }

    #[tokio::test]
    async fn fetch_page_converts_to_markdown() {
        let server = MockServer::start().await;

        let html = r#"<html><body>
            <h1>Guide</h1>
            <p>Some <strong>bold</strong> text.</p>
            <a href="/next">Next</a>
        </body></html>"#;

        Mock::given(method("GET"))
            .and(path("/guide"))
            .respond_with(ResponseTemplate::new(200).set_body_string(html))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&format!("{}/guide", server.uri())).unwrap();
        let page = fetcher.fetch_page(&url).await.unwrap();

        assert_eq!(page.title.as_deref(), Some("Guide"));
        assert!(page.markdown.contains("# Guide"));
        assert!(page.markdown.contains("**bold**"));
        assert_eq!(page.links.len(), 1);
    }

    #[tokio::test]
    async fn fetch_error_includes_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let err = fetcher.fetch_page(&url).await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
