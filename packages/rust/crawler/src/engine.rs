//! Crawl strategy detection and the bounded crawl engine.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use ragforge_shared::{RagForgeError, Result};

use crate::fetcher::{FetchedPage, PageFetcher};
use crate::sitemap::extract_sitemap_urls;

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// How a start URL should be ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStrategy {
    /// Plain text file fetched as-is.
    DirectFile,
    /// Sitemap XML enumerating the pages to fetch.
    Sitemap,
    /// Breadth-first crawl following same-host links.
    Recursive,
}

impl CrawlStrategy {
    /// Classify a URL by its path: text-file extensions win, then anything
    /// that looks like a sitemap, then recursive crawling as the default.
    pub fn detect(url: &Url) -> Self {
        let path = url.path().to_ascii_lowercase();

        if path.ends_with(".txt") || path.ends_with(".md") || path.ends_with(".markdown") {
            CrawlStrategy::DirectFile
        } else if path.contains("sitemap") {
            CrawlStrategy::Sitemap
        } else {
            CrawlStrategy::Recursive
        }
    }
}

// ---------------------------------------------------------------------------
// Budget and output types
// ---------------------------------------------------------------------------

/// Hard limits for one crawl run.
#[derive(Debug, Clone)]
pub struct CrawlBudget {
    /// Total pages fetched across all strategies.
    pub max_pages: usize,
    /// BFS levels fetched by the recursive strategy, counting the start
    /// URL's level (1 = start URL only).
    pub max_depth: usize,
    /// Concurrent in-flight fetches.
    pub max_concurrent: usize,
    /// Wall-clock deadline for the whole crawl.
    pub timeout: Duration,
    /// Pause between BFS levels (politeness toward the target host).
    pub level_delay: Duration,
}

impl Default for CrawlBudget {
    fn default() -> Self {
        Self {
            max_pages: 300,
            max_depth: 2,
            max_concurrent: 3,
            timeout: Duration::from_secs(90),
            level_delay: Duration::from_secs(1),
        }
    }
}

/// A crawled page ready for chunking.
#[derive(Debug, Clone)]
pub struct CrawlPage {
    pub url: Url,
    pub title: Option<String>,
    pub markdown: String,
}

/// Summary of a completed crawl.
#[derive(Debug)]
pub struct CrawlOutcome {
    /// Pages in fetch order (sitemap order, or BFS discovery order).
    pub pages: Vec<CrawlPage>,
    /// URLs skipped by dedup, scope, or budget truncation.
    pub pages_skipped: usize,
    /// Per-page failures (URL, error message). These never abort the crawl.
    pub errors: Vec<(String, String)>,
    pub duration: Duration,
    pub strategy: CrawlStrategy,
}

// ---------------------------------------------------------------------------
// Crawler
// ---------------------------------------------------------------------------

/// Bounded crawler dispatching on [`CrawlStrategy`].
pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    budget: CrawlBudget,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, budget: CrawlBudget) -> Self {
        Self { fetcher, budget }
    }

    /// Crawl from `start_url`, picking the strategy automatically.
    #[instrument(skip_all, fields(url = %start_url))]
    pub async fn crawl(&self, start_url: &Url) -> Result<CrawlOutcome> {
        let strategy = CrawlStrategy::detect(start_url);
        let started = Instant::now();

        info!(
            ?strategy,
            max_pages = self.budget.max_pages,
            max_depth = self.budget.max_depth,
            "starting crawl"
        );

        let mut outcome = match strategy {
            CrawlStrategy::DirectFile => self.crawl_direct_file(start_url).await?,
            CrawlStrategy::Sitemap => self.crawl_sitemap(start_url).await?,
            CrawlStrategy::Recursive => self.crawl_recursive(start_url).await?,
        };
        outcome.duration = started.elapsed();

        info!(
            pages = outcome.pages.len(),
            skipped = outcome.pages_skipped,
            errors = outcome.errors.len(),
            duration_ms = outcome.duration.as_millis(),
            "crawl completed"
        );

        Ok(outcome)
    }

    /// Fetch a single text file verbatim. A failed fetch yields an empty
    /// outcome with the error recorded, matching the other strategies'
    /// keep-going behavior.
    async fn crawl_direct_file(&self, url: &Url) -> Result<CrawlOutcome> {
        let (pages, errors) = match self.fetcher.fetch_text(url).await {
            Ok(text) => (
                vec![CrawlPage {
                    url: url.clone(),
                    title: None,
                    markdown: text,
                }],
                Vec::new(),
            ),
            Err(e) => {
                warn!(%url, error = %e, "direct file fetch failed");
                (Vec::new(), vec![(url.to_string(), e.to_string())])
            }
        };

        Ok(CrawlOutcome {
            pages,
            pages_skipped: 0,
            errors,
            duration: Duration::ZERO,
            strategy: CrawlStrategy::DirectFile,
        })
    }

    /// Fetch every URL a sitemap lists, up to the page budget, keeping
    /// sitemap order.
    async fn crawl_sitemap(&self, sitemap_url: &Url) -> Result<CrawlOutcome> {
        let xml = self.fetcher.fetch_text(sitemap_url).await?;
        let mut urls = extract_sitemap_urls(&xml);

        if urls.is_empty() {
            return Err(RagForgeError::parse(format!(
                "sitemap {sitemap_url} contains no URLs"
            )));
        }

        let mut pages_skipped = 0;
        if urls.len() > self.budget.max_pages {
            pages_skipped = urls.len() - self.budget.max_pages;
            warn!(
                listed = urls.len(),
                max_pages = self.budget.max_pages,
                "sitemap exceeds page budget, truncating"
            );
            urls.truncate(self.budget.max_pages);
        }

        let mut pages = Vec::new();
        let mut errors = Vec::new();
        for (url, result) in self.fetch_batch(urls).await {
            match result {
                Ok(page) => pages.push(CrawlPage {
                    url: page.url,
                    title: page.title,
                    markdown: page.markdown,
                }),
                Err(e) => {
                    warn!(%url, error = %e, "sitemap page failed");
                    errors.push((url.to_string(), e.to_string()));
                }
            }
        }

        Ok(CrawlOutcome {
            pages,
            pages_skipped,
            errors,
            duration: Duration::ZERO,
            strategy: CrawlStrategy::Sitemap,
        })
    }

    /// Breadth-first crawl from `start_url`, one level at a time.
    ///
    /// The visited set lives in this loop only: links discovered by the
    /// concurrent fetch tasks come back here before the next level is
    /// formed, so no lock is needed for deduplication.
    async fn crawl_recursive(&self, start_url: &Url) -> Result<CrawlOutcome> {
        let deadline = Instant::now() + self.budget.timeout;
        let base_host = start_url.host_str().unwrap_or_default().to_string();

        let mut visited: HashSet<Url> = HashSet::new();
        visited.insert(dedup_key(start_url));

        let mut frontier = vec![start_url.clone()];
        let mut pages: Vec<CrawlPage> = Vec::new();
        let mut errors: Vec<(String, String)> = Vec::new();
        let mut pages_skipped = 0;

        for depth in 0..self.budget.max_depth {
            if frontier.is_empty() {
                break;
            }

            let remaining = self.budget.max_pages.saturating_sub(pages.len());
            if frontier.len() > remaining {
                pages_skipped += frontier.len() - remaining;
                frontier.truncate(remaining);
            }
            if frontier.is_empty() {
                warn!(max_pages = self.budget.max_pages, "page budget reached");
                break;
            }

            debug!(depth, urls = frontier.len(), "crawling level");

            let mut next_level: Vec<Url> = Vec::new();
            for (url, result) in self.fetch_batch(frontier).await {
                match result {
                    Ok(page) => {
                        for link in &page.links {
                            if !in_scope(link, &base_host) {
                                continue;
                            }
                            if visited.insert(dedup_key(link)) {
                                next_level.push(link.clone());
                            }
                        }
                        pages.push(CrawlPage {
                            url: page.url,
                            title: page.title,
                            markdown: page.markdown,
                        });
                    }
                    Err(e) => {
                        warn!(%url, error = %e, "page failed");
                        errors.push((url.to_string(), e.to_string()));
                    }
                }
            }

            if Instant::now() >= deadline {
                warn!(timeout_secs = self.budget.timeout.as_secs(), "crawl deadline reached");
                break;
            }

            frontier = next_level;
            if depth + 1 < self.budget.max_depth
                && !frontier.is_empty()
                && !self.budget.level_delay.is_zero()
            {
                tokio::time::sleep(self.budget.level_delay).await;
            }
        }

        Ok(CrawlOutcome {
            pages,
            pages_skipped,
            errors,
            duration: Duration::ZERO,
            strategy: CrawlStrategy::Recursive,
        })
    }

    /// Fetch a batch of URLs with bounded concurrency, returning results
    /// in input order.
    async fn fetch_batch(&self, urls: Vec<Url>) -> Vec<(Url, Result<FetchedPage>)> {
        let semaphore = Arc::new(Semaphore::new(self.budget.max_concurrent));
        let mut handles = Vec::with_capacity(urls.len());

        for url in urls {
            let fetcher = self.fetcher.clone();
            let sem = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire().await;
                let result = fetcher.fetch_page(&url).await;
                (url, result)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(pair) => results.push(pair),
                Err(e) => warn!(error = %e, "fetch task panicked"),
            }
        }
        results
    }
}

/// Scope filter for the recursive strategy: http(s) links on the start
/// URL's host only.
fn in_scope(url: &Url, base_host: &str) -> bool {
    matches!(url.scheme(), "http" | "https") && url.host_str() == Some(base_host)
}

/// Key used for visited-set deduplication: the URL with its fragment
/// stripped.
fn dedup_key(url: &Url) -> Url {
    let mut key = url.clone();
    key.set_fragment(None);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::HttpFetcher;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_budget() -> CrawlBudget {
        CrawlBudget {
            level_delay: Duration::ZERO,
            ..CrawlBudget::default()
        }
    }

    fn crawler(budget: CrawlBudget) -> Crawler {
        Crawler::new(Arc::new(HttpFetcher::new().unwrap()), budget)
    }

    async fn mount_page(server: &MockServer, route: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }

    #[test]
    fn strategy_detection() {
        let detect = |s: &str| CrawlStrategy::detect(&Url::parse(s).unwrap());

        assert_eq!(detect("https://x.com/llms.txt"), CrawlStrategy::DirectFile);
        assert_eq!(detect("https://x.com/README.md"), CrawlStrategy::DirectFile);
        assert_eq!(
            detect("https://x.com/doc.markdown"),
            CrawlStrategy::DirectFile
        );
        assert_eq!(detect("https://x.com/sitemap.xml"), CrawlStrategy::Sitemap);
        assert_eq!(
            detect("https://x.com/sitemap_index.xml"),
            CrawlStrategy::Sitemap
        );
        assert_eq!(detect("https://x.com/docs/"), CrawlStrategy::Recursive);
        assert_eq!(detect("https://x.com/"), CrawlStrategy::Recursive);
    }

    #[tokio::test]
    async fn direct_file_returns_raw_text() {
        let server = MockServer::start().await;
        mount_page(&server, "/notes.txt", "# Plain notes\nno html here").await;

        let crawler = crawler(test_budget());
        let url = Url::parse(&format!("{}/notes.txt", server.uri())).unwrap();
        let outcome = crawler.crawl(&url).await.unwrap();

        assert_eq!(outcome.strategy, CrawlStrategy::DirectFile);
        assert_eq!(outcome.pages.len(), 1);
        assert_eq!(outcome.pages[0].markdown, "# Plain notes\nno html here");
    }

    #[tokio::test]
    async fn recursive_crawl_dedupes_cycles() {
        let server = MockServer::start().await;

        // a and b link to each other; the cycle must not loop.
        mount_page(
            &server,
            "/a",
            r#"<html><body><h1>A</h1><a href="/b">b</a></body></html>"#,
        )
        .await;
        mount_page(
            &server,
            "/b",
            r#"<html><body><h1>B</h1><a href="/a">a</a><a href="/a#frag">a again</a></body></html>"#,
        )
        .await;

        let crawler = crawler(test_budget());
        let url = Url::parse(&format!("{}/a", server.uri())).unwrap();
        let outcome = crawler.crawl(&url).await.unwrap();

        assert_eq!(outcome.pages.len(), 2);
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn recursive_crawl_respects_max_depth() {
        let server = MockServer::start().await;

        mount_page(
            &server,
            "/root",
            r#"<html><body><a href="/l1">one</a></body></html>"#,
        )
        .await;
        mount_page(
            &server,
            "/l1",
            r#"<html><body><a href="/l2">two</a></body></html>"#,
        )
        .await;
        mount_page(&server, "/l2", "<html><body>deep</body></html>").await;

        let url = Url::parse(&format!("{}/root", server.uri())).unwrap();

        // Two levels: the start page's level counts as the first, so only
        // root and l1 are fetched; l2 is beyond the depth budget.
        let crawler = crawler(CrawlBudget {
            max_depth: 2,
            ..test_budget()
        });
        let outcome = crawler.crawl(&url).await.unwrap();
        assert_eq!(outcome.pages.len(), 2);

        // One level fetches the start page only.
        let crawler = self::crawler(CrawlBudget {
            max_depth: 1,
            ..test_budget()
        });
        let outcome = crawler.crawl(&url).await.unwrap();
        assert_eq!(outcome.pages.len(), 1);
        assert!(outcome.pages[0].url.path().ends_with("/root"));
    }

    #[tokio::test]
    async fn recursive_crawl_respects_max_pages() {
        let server = MockServer::start().await;

        let root = r#"<html><body>
            <a href="/p1">1</a><a href="/p2">2</a><a href="/p3">3</a>
        </body></html>"#;
        mount_page(&server, "/root", root).await;
        for p in ["/p1", "/p2", "/p3"] {
            mount_page(&server, p, "<html><body>page</body></html>").await;
        }

        let crawler = crawler(CrawlBudget {
            max_pages: 2,
            ..test_budget()
        });
        let url = Url::parse(&format!("{}/root", server.uri())).unwrap();
        let outcome = crawler.crawl(&url).await.unwrap();

        assert_eq!(outcome.pages.len(), 2);
        assert_eq!(outcome.pages_skipped, 2);
    }

    #[tokio::test]
    async fn recursive_crawl_stays_on_host() {
        let server = MockServer::start().await;

        mount_page(
            &server,
            "/only",
            r#"<html><body><a href="https://elsewhere.invalid/page">external</a></body></html>"#,
        )
        .await;

        let crawler = crawler(test_budget());
        let url = Url::parse(&format!("{}/only", server.uri())).unwrap();
        let outcome = crawler.crawl(&url).await.unwrap();

        assert_eq!(outcome.pages.len(), 1);
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn sitemap_crawl_truncates_to_budget_in_order() {
        let server = MockServer::start().await;

        let sitemap = format!(
            r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                <url><loc>{0}/a</loc></url>
                <url><loc>{0}/b</loc></url>
                <url><loc>{0}/c</loc></url>
            </urlset>"#,
            server.uri()
        );
        mount_page(&server, "/sitemap.xml", &sitemap).await;
        mount_page(&server, "/a", "<html><body><h1>A</h1></body></html>").await;
        mount_page(&server, "/b", "<html><body><h1>B</h1></body></html>").await;
        mount_page(&server, "/c", "<html><body><h1>C</h1></body></html>").await;

        let crawler = crawler(CrawlBudget {
            max_pages: 2,
            ..test_budget()
        });
        let url = Url::parse(&format!("{}/sitemap.xml", server.uri())).unwrap();
        let outcome = crawler.crawl(&url).await.unwrap();

        assert_eq!(outcome.strategy, CrawlStrategy::Sitemap);
        assert_eq!(outcome.pages.len(), 2);
        assert_eq!(outcome.pages_skipped, 1);
        assert_eq!(outcome.pages[0].title.as_deref(), Some("A"));
        assert_eq!(outcome.pages[1].title.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn sitemap_page_failure_does_not_abort() {
        let server = MockServer::start().await;

        let sitemap = format!(
            r#"<urlset>
                <url><loc>{0}/ok</loc></url>
                <url><loc>{0}/gone</loc></url>
            </urlset>"#,
            server.uri()
        );
        mount_page(&server, "/sitemap.xml", &sitemap).await;
        mount_page(&server, "/ok", "<html><body><h1>OK</h1></body></html>").await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let crawler = crawler(test_budget());
        let url = Url::parse(&format!("{}/sitemap.xml", server.uri())).unwrap();
        let outcome = crawler.crawl(&url).await.unwrap();

        assert_eq!(outcome.pages.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].0.ends_with("/gone"));
    }

    #[tokio::test]
    async fn empty_sitemap_is_an_error() {
        let server = MockServer::start().await;
        mount_page(&server, "/sitemap.xml", "<urlset></urlset>").await;

        let crawler = crawler(test_budget());
        let url = Url::parse(&format!("{}/sitemap.xml", server.uri())).unwrap();
        assert!(crawler.crawl(&url).await.is_err());
    }
}
