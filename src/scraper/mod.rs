pub mod cleaner;
pub mod dom;
pub mod http_client;
pub mod parsers;
pub mod schema;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

pub use self::http_client::{FetchError, HttpClient};
use self::parsers::parse_listing_page;

/// A fetched page: final URL (after redirects) and body.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub html: String,
}

// ── Fetch seam ────────────────────────────────────────────────────────────────

/// Swappable page source. The record assembler never has more than one
/// request in flight per record.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError>;
}

// ── Listing discovery ─────────────────────────────────────────────────────────

/// Search-results URL for auctions published on `date`.
pub fn listing_url(base_url: &str, date: NaiveDate) -> String {
    let day = date.format("%d.%m.%Y");
    format!(
        "{}/market/?searching=1&date=1&date_start_dmy={day}&date_end_dmy={day}&trade=buy&lot_type=0",
        base_url.trim_end_matches('/')
    )
}

/// Walk the search results starting at `start_url` and collect item URLs.
/// Stops after `max_pages` pages or on the first failed fetch.
pub async fn discover_item_urls(
    fetcher: &dyn PageFetcher,
    start_url: &str,
    max_pages: usize,
) -> Vec<String> {
    let mut urls = Vec::new();
    let mut next = Some(start_url.to_string());
    let mut page_no = 0usize;

    while let Some(url) = next.take() {
        page_no += 1;
        if page_no > max_pages {
            warn!("Reached listing page limit ({}), stopping", max_pages);
            break;
        }

        info!("Fetching listing page {} ({})", page_no, url);
        let page = match fetcher.fetch(&url).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Listing page {} failed: {}", url, e);
                break;
            }
        };

        let listing = parse_listing_page(&page);
        debug!("  Page {}: {} items", page_no, listing.item_urls.len());
        if listing.item_urls.is_empty() {
            break;
        }
        urls.extend(listing.item_urls);
        next = listing.next_page.filter(|n| *n != url);
    }

    urls.dedup();
    urls
}
