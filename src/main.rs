mod config;
mod export;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;
use crate::pipeline::{Assembly, Pipeline, assemble_record};
use crate::scraper::HttpClient;
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "market-auctions", about = "Procurement auction scraper", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl auctions published over the last N days (today excluded) and store them
    Crawl {
        /// Days to look back (default: pipeline.days_back)
        #[arg(short, long, env = "MARKET_DAYS")]
        days: Option<u32>,
    },

    /// Assemble a single auction and print it as JSON (nothing is stored)
    Item {
        /// Item page URL
        url: String,
    },

    /// Export stored auctions to CSV
    Export {
        #[arg(short, long, default_value = "data/auctions.csv")]
        out: PathBuf,
    },

    /// Show database statistics
    Stats,

    /// Apply schema migrations without crawling
    Migrate,
}

fn open_repo(config: &AppConfig) -> Result<Repository> {
    let repo = Repository::open(&config.storage.db_path).context("Failed to open DuckDB")?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(repo)
}

fn fmt_time(t: Option<chrono::NaiveDateTime>) -> String {
    t.map(|t| t.format("%Y-%m-%d %H:%M").to_string()).unwrap_or("—".into())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "market_auctions=info,warn",
        1 => "market_auctions=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::new(filter))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Crawl { days } => {
            let _t = utils::Timer::start("Auction crawl");
            let days = days.unwrap_or(config.pipeline.days_back);
            let mut repo = open_repo(&config)?;
            let client = HttpClient::new(&config.scraper).context("Failed to build HTTP client")?;

            let stats = Pipeline::new(&config, Arc::new(client)).run(&mut repo, days).await?;
            info!(
                "Done: {} saved, {} skipped, {} failed, {} errors",
                stats.saved, stats.skipped, stats.failed, stats.errors
            );
        }

        Command::Item { url } => {
            let client = HttpClient::new(&config.scraper).context("Failed to build HTTP client")?;
            match assemble_record(&client, &url, config.pipeline.emit_partial_records).await {
                Assembly::Emitted(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                Assembly::Skipped => println!("Already published elsewhere, nothing to assemble."),
                Assembly::Failed => anyhow::bail!("Could not assemble {}", url),
            }
        }

        Command::Export { out } => {
            let _t = utils::Timer::start("CSV export");
            let repo = open_repo(&config)?;
            let records = repo.load_auctions()?;
            let n = export::export_to_path(&records, &out)?;
            println!("{} auctions written to {:?}", utils::fmt_number(n as i64), out);
        }

        Command::Stats => {
            let repo = open_repo(&config)?;
            let stats = repo.stats()?;
            println!("─────────────────────────────────");
            println!("  Market auctions — Database Stats");
            println!("─────────────────────────────────");
            println!("  Auctions   : {}", utils::fmt_number(stats.auctions));
            println!("  Line items : {}", utils::fmt_number(stats.line_items));
            println!("  From       : {}", fmt_time(stats.first_published));
            println!("  To         : {}", fmt_time(stats.last_published));
            println!("  Last run   : {}", fmt_time(stats.last_run));
            println!("─────────────────────────────────");
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}
