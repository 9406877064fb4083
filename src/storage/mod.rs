use crate::models::AuctionRecord;
use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use duckdb::{Connection, params};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE SEQUENCE IF NOT EXISTS scrape_run_ids START 1;

CREATE TABLE IF NOT EXISTS auctions (
    url                         VARCHAR PRIMARY KEY,
    external_id                 UBIGINT,
    purchase_code_name          VARCHAR,
    name                        VARCHAR,
    publication_date_time       TIMESTAMP,
    submission_close_date_time  TIMESTAMP,
    -- NULL unless the price reduced to a number
    initial_sum                 DOUBLE,
    -- Price text kept when it did not parse
    initial_sum_text            VARCHAR,
    currency_name               VARCHAR,
    placer_inn                  VARCHAR,
    placer_name                 VARCHAR,
    delivery_place              VARCHAR,
    line_item_count             INTEGER NOT NULL DEFAULT 0,
    payload                     VARCHAR NOT NULL,
    scraped_at                  TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS line_items (
    auction_url     VARCHAR  NOT NULL,
    ordinal         INTEGER  NOT NULL,
    ordinal_number  VARCHAR,
    name            VARCHAR,
    qty             VARCHAR,
    okpd2_code      VARCHAR,
    okpd2_name      VARCHAR,
    okved2_code     VARCHAR,
    okved2_name     VARCHAR,
    PRIMARY KEY (auction_url, ordinal)
);

CREATE TABLE IF NOT EXISTS scrape_runs (
    id                  INTEGER PRIMARY KEY DEFAULT nextval('scrape_run_ids'),
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    items_discovered    INTEGER DEFAULT 0,
    records_saved       INTEGER DEFAULT 0,
    error_msg           VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_line_items_auction ON line_items (auction_url);
"#;

// ── Sink ──────────────────────────────────────────────────────────────────────

/// Destination for finished records.
pub trait RecordSink {
    fn emit(&mut self, record: &AuctionRecord) -> Result<()>;
}

impl RecordSink for Vec<AuctionRecord> {
    fn emit(&mut self, record: &AuctionRecord) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

impl RecordSink for Repository {
    fn emit(&mut self, record: &AuctionRecord) -> Result<()> {
        self.save_auction(record)
    }
}

// ── Repository ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunCounts {
    pub discovered: usize,
    pub saved: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub auctions: i64,
    pub line_items: i64,
    pub first_published: Option<NaiveDateTime>,
    pub last_published: Option<NaiveDateTime>,
    pub last_run: Option<NaiveDateTime>,
}

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Auctions ──────────────────────────────────────────────────────────────

    /// Upsert one auction and its line items. Items beyond the new count are
    /// removed. Idempotent.
    pub fn save_auction(&self, record: &AuctionRecord) -> Result<()> {
        let payload = serde_json::to_string(record)
            .with_context(|| format!("serialize {}", record.url))?;
        let items = record.lot_items.as_deref().unwrap_or_default();
        let placer_name = record.placer.short_name.clone().or_else(|| record.placer.full_name.clone());

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"INSERT INTO auctions
                   (url, external_id, purchase_code_name, name,
                    publication_date_time, submission_close_date_time,
                    initial_sum, initial_sum_text, currency_name,
                    placer_inn, placer_name, delivery_place,
                    line_item_count, payload, scraped_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (url) DO UPDATE SET
                   external_id                = excluded.external_id,
                   purchase_code_name         = excluded.purchase_code_name,
                   name                       = excluded.name,
                   publication_date_time      = excluded.publication_date_time,
                   submission_close_date_time = excluded.submission_close_date_time,
                   initial_sum                = excluded.initial_sum,
                   initial_sum_text           = excluded.initial_sum_text,
                   currency_name              = excluded.currency_name,
                   placer_inn                 = COALESCE(excluded.placer_inn,  auctions.placer_inn),
                   placer_name                = COALESCE(excluded.placer_name, auctions.placer_name),
                   delivery_place             = excluded.delivery_place,
                   line_item_count            = excluded.line_item_count,
                   payload                    = excluded.payload,
                   scraped_at                 = excluded.scraped_at"#,
            params![
                record.url,
                record.external_id,
                record.purchase_code_name,
                record.name,
                record.publication_date_time,
                record.submission_close_date_time,
                record.initial_sum.amount(),
                record.initial_sum.raw_text(),
                record.currency_name,
                record.placer.inn,
                placer_name,
                record.delivery_place,
                items.len() as i64,
                payload,
                Utc::now().naive_utc(),
            ],
        )
        .with_context(|| format!("upsert auction {}", record.url))?;

        for (i, item) in items.iter().enumerate() {
            tx.execute(
                r#"INSERT INTO line_items
                       (auction_url, ordinal, ordinal_number, name, qty,
                        okpd2_code, okpd2_name, okved2_code, okved2_name)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT (auction_url, ordinal) DO UPDATE SET
                       ordinal_number = excluded.ordinal_number,
                       name           = excluded.name,
                       qty            = excluded.qty,
                       okpd2_code     = excluded.okpd2_code,
                       okpd2_name     = excluded.okpd2_name,
                       okved2_code    = excluded.okved2_code,
                       okved2_name    = excluded.okved2_name"#,
                params![
                    record.url,
                    (i + 1) as i64,
                    item.ordinal_number,
                    item.name,
                    item.qty,
                    item.okpd2_code,
                    item.okpd2_name,
                    item.okved2_code,
                    item.okved2_name,
                ],
            )
            .with_context(|| format!("upsert line item {} of {}", i + 1, record.url))?;
        }
        tx.execute(
            "DELETE FROM line_items WHERE auction_url = ? AND ordinal > ?",
            params![record.url, items.len() as i64],
        )?;

        tx.commit()?;
        debug!("saved {} ({} line items)", record.url, items.len());
        Ok(())
    }

    /// Identifiers already collected; used to skip items before crawling them.
    pub fn known_ids(&self) -> Result<HashSet<u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT external_id FROM auctions WHERE external_id IS NOT NULL")?;
        let ids = stmt
            .query_map([], |r| r.get::<_, u64>(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    /// Every stored record, decoded from its JSON payload, oldest first.
    pub fn load_auctions(&self) -> Result<Vec<AuctionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, payload FROM auctions ORDER BY publication_date_time NULLS LAST, url",
        )?;
        let rows: Vec<(String, String)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .filter_map(|r| r.ok())
            .collect();

        let mut records = Vec::with_capacity(rows.len());
        for (url, payload) in rows {
            match serde_json::from_str(&payload) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Stored payload for {} is unreadable: {}", url, e),
            }
        }
        Ok(records)
    }

    pub fn auction_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM auctions")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn line_item_count(&self) -> Result<i64> {
        let mut s = self.conn.prepare("SELECT COUNT(*) FROM line_items")?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let mut s = self
            .conn
            .prepare("SELECT MIN(publication_date_time), MAX(publication_date_time) FROM auctions")?;
        let (first_published, last_published): (Option<NaiveDateTime>, Option<NaiveDateTime>) =
            s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?;

        let mut s = self.conn.prepare("SELECT MAX(started_at) FROM scrape_runs")?;
        let last_run: Option<NaiveDateTime> = s.query_row([], |r| r.get(0))?;

        Ok(StoreStats {
            auctions: self.auction_count()?,
            line_items: self.line_item_count()?,
            first_published,
            last_published,
            last_run,
        })
    }

    // ── Scrape run log ────────────────────────────────────────────────────────

    pub fn begin_scrape_run(&self) -> Result<i64> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO scrape_runs (started_at, status) VALUES (?, 'running') RETURNING id",
            params![Utc::now().naive_utc()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_scrape_run(&self, run_id: i64, counts: RunCounts, error: Option<&str>) -> Result<()> {
        self.conn.execute(
            r#"UPDATE scrape_runs SET
               finished_at = ?, status = ?,
               items_discovered = ?, records_saved = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                counts.discovered as i64,
                counts.saved as i64,
                error,
                run_id,
            ],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub fn run_status(&self, run_id: i64) -> Result<Option<String>> {
        let mut s = self.conn.prepare("SELECT status FROM scrape_runs WHERE id = ?")?;
        Ok(s.query_row(params![run_id], |r| r.get(0)).ok())
    }
}
