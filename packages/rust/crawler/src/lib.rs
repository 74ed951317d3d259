//! Bounded web crawler with strategy auto-detection.
//!
//! A start URL is classified as a direct text file, a sitemap, or a page
//! to crawl recursively; [`Crawler::crawl`] dispatches accordingly and
//! returns markdown pages. All strategies respect the page, depth,
//! concurrency, and wall-clock budgets in [`CrawlBudget`].

mod engine;
mod fetcher;
mod sitemap;

pub use engine::{CrawlBudget, CrawlOutcome, CrawlPage, CrawlStrategy, Crawler};
pub use fetcher::{FetchedPage, HttpFetcher, PageFetcher};
pub use sitemap::extract_sitemap_urls;
