//! Pipeline orchestrator: listing discovery → record assembly → sink.
//!
//! ## Run modes
//!
//! `run()`: crawl mode (default / cron use)
//!   1. Walk the search results for each of the last N days (today excluded)
//!   2. Drop items whose identifier is already stored
//!   3. Assemble every remaining item (item → placer → positions pages) and save it
//!   Idempotent: re-running the same window re-saves nothing when `skip_known` is on.
//!
//! `assemble_record()`: a single item, used by the `item` command.

pub mod materializer;
pub mod traversal;

use crate::config::{AppConfig, PipelineConfig};
use crate::models::AuctionRecord;
use crate::scraper::cleaner::parse_identifier;
use crate::scraper::{PageFetcher, discover_item_urls, listing_url};
use crate::storage::{RecordSink, Repository, RunCounts};
use crate::utils::fmt_number;
use anyhow::{Context, Result};
use chrono::{Days, Local, NaiveDate};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{Instrument, error, info, info_span, warn};

use self::materializer::materialize;
use self::traversal::{Transition, Traversal};

/// Result of walking one item's pages.
#[derive(Debug)]
pub enum Assembly {
    Emitted(Box<AuctionRecord>),
    /// Item page marked as already published elsewhere.
    Skipped,
    /// The item page failed, or a later page failed with partial output off.
    Failed,
}

/// Walk the pages of one item, one fetch at a time, and materialize the result.
pub async fn assemble_record(fetcher: &dyn PageFetcher, url: &str, emit_partial: bool) -> Assembly {
    let (mut traversal, mut request) = Traversal::discovered(url);

    loop {
        let page = match fetcher.fetch(&request.url).await {
            Ok(page) => page,
            Err(e) => {
                warn!("{:?} page failed for {}: {}", request.kind, url, e);
                return match traversal.abandon(emit_partial) {
                    Some(record) => Assembly::Emitted(Box::new(materialize(record))),
                    None => Assembly::Failed,
                };
            }
        };

        match traversal.advance(&page) {
            Transition::Fetch(next, next_request) => {
                traversal = next;
                request = next_request;
            }
            Transition::Finalize(record) => return Assembly::Emitted(Box::new(materialize(record))),
            Transition::Discard => return Assembly::Skipped,
        }
    }
}

/// Split off URLs whose identifier is already stored.
pub fn drop_known(urls: Vec<String>, known: &HashSet<u64>) -> (Vec<String>, usize) {
    let before = urls.len();
    let fresh: Vec<String> = urls
        .into_iter()
        .filter(|url| parse_identifier(url).is_none_or(|id| !known.contains(&id)))
        .collect();
    let dropped = before - fresh.len();
    (fresh, dropped)
}

pub struct Pipeline {
    config: PipelineConfig,
    base_url: String,
    fetcher: Arc<dyn PageFetcher>,
}

impl Pipeline {
    pub fn new(config: &AppConfig, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            config: config.pipeline.clone(),
            base_url: config.scraper.base_url.clone(),
            fetcher,
        }
    }

    /// Search-result URLs for the `days` days before `today`, oldest first.
    pub fn listing_urls(&self, today: NaiveDate, days: u32) -> Vec<String> {
        (1..=days)
            .rev()
            .filter_map(|back| today.checked_sub_days(Days::new(back.into())))
            .map(|date| listing_url(&self.base_url, date))
            .collect()
    }

    /// Item URLs from every listing in the window, first occurrence kept.
    pub async fn discover(&self, today: NaiveDate, days: u32) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        for listing in self.listing_urls(today, days) {
            let found =
                discover_item_urls(self.fetcher.as_ref(), &listing, self.config.max_listing_pages).await;
            urls.extend(found.into_iter().filter(|u| seen.insert(u.clone())));
        }
        urls
    }

    /// Assemble every URL under the concurrency limit and hand finished
    /// records to `sink` in input order.
    pub async fn assemble_all(&self, urls: Vec<String>, sink: &mut dyn RecordSink) -> PipelineStats {
        let sem = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(urls.len());
        let mut stats = PipelineStats { discovered: urls.len(), ..Default::default() };

        for url in urls {
            let fetcher = Arc::clone(&self.fetcher);
            let sem = Arc::clone(&sem);
            let emit_partial = self.config.emit_partial_records;
            let task_url = url.clone();
            let span = info_span!("record", url = %url);

            let task = async move {
                let _permit = sem.acquire().await?;
                let outcome = assemble_record(fetcher.as_ref(), &task_url, emit_partial).await;
                Ok::<Assembly, anyhow::Error>(outcome)
            };
            let handle = tokio::spawn(task.instrument(span));

            handles.push((url, handle));
        }

        for (url, handle) in handles {
            match handle.await {
                Ok(Ok(Assembly::Emitted(record))) => match sink.emit(&record) {
                    Ok(()) => stats.saved += 1,
                    Err(e) => {
                        warn!("{}: save failed: {:#}", url, e);
                        stats.errors += 1;
                    }
                },
                Ok(Ok(Assembly::Skipped)) => stats.skipped += 1,
                Ok(Ok(Assembly::Failed)) => stats.failed += 1,
                Ok(Err(e)) => {
                    warn!("{}: {:#}", url, e);
                    stats.errors += 1;
                }
                Err(e) => {
                    error!("Task panic for {}: {}", url, e);
                    stats.errors += 1;
                }
            }
        }

        stats
    }

    pub async fn run(&self, repo: &mut Repository, days: u32) -> Result<PipelineStats> {
        let run_id = repo.begin_scrape_run().unwrap_or(0);

        // ── 1. Discover item URLs ─────────────────────────────────────────────
        info!("=== Step 1: Discovering items ({} days back) ===", days);
        let today = Local::now().date_naive();
        let mut urls = self.discover(today, days).await;
        let discovered = urls.len();

        let mut already_known = 0;
        if self.config.skip_known {
            let known = repo.known_ids().context("Failed to read stored identifiers")?;
            (urls, already_known) = drop_known(urls, &known);
        }
        info!("{} items found, {} already stored", discovered, already_known);

        // ── 2. Assemble and save ──────────────────────────────────────────────
        info!("=== Step 2: Assembling {} records ===", urls.len());
        let mut stats = self.assemble_all(urls, repo).await;
        stats.discovered = discovered;
        stats.already_known = already_known;

        let problems = stats.failed + stats.errors;
        let error_msg = format!("{} failed, {} errors", stats.failed, stats.errors);
        repo.finish_scrape_run(
            run_id,
            RunCounts { discovered, saved: stats.saved },
            if problems > 0 { Some(error_msg.as_str()) } else { None },
        )
        .ok();

        info!(
            "=== Done: {} discovered | {} known | {} saved | {} skipped | {} failed | {} errors | {} in DB ===",
            stats.discovered,
            stats.already_known,
            stats.saved,
            stats.skipped,
            stats.failed,
            stats.errors,
            fmt_number(repo.auction_count().unwrap_or(0)),
        );

        Ok(stats)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub discovered: usize,
    pub already_known: usize,
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: usize,
}
