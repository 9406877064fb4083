//! Flat CSV export of stored auctions, one row per auction.

use crate::models::AuctionRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::info;

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    external_id: Option<u64>,
    url: &'a str,
    purchase_code_name: Option<&'a str>,
    name: Option<&'a str>,
    publication_date_time: Option<String>,
    submission_close_date_time: Option<String>,
    initial_sum: Option<f64>,
    initial_sum_text: Option<&'a str>,
    currency_name: Option<&'a str>,
    placer_name: Option<&'a str>,
    placer_inn: Option<&'a str>,
    delivery_place: Option<&'a str>,
    line_items: usize,
    okpd2_codes: String,
}

impl<'a> From<&'a AuctionRecord> for ExportRow<'a> {
    fn from(r: &'a AuctionRecord) -> Self {
        let items = r.lot_items.as_deref().unwrap_or_default();
        let mut codes: Vec<&str> = items.iter().filter_map(|i| i.okpd2_code.as_deref()).collect();
        codes.sort_unstable();
        codes.dedup();

        Self {
            external_id: r.external_id,
            url: &r.url,
            purchase_code_name: r.purchase_code_name.as_deref(),
            name: r.name.as_deref(),
            publication_date_time: r.publication_date_time.map(|d| d.format("%Y-%m-%d %H:%M").to_string()),
            submission_close_date_time: r
                .submission_close_date_time
                .map(|d| d.format("%Y-%m-%d %H:%M").to_string()),
            initial_sum: r.initial_sum.amount(),
            initial_sum_text: r.initial_sum.raw_text(),
            currency_name: r.currency_name.as_deref(),
            placer_name: r.placer.short_name.as_deref().or(r.placer.full_name.as_deref()),
            placer_inn: r.placer.inn.as_deref(),
            delivery_place: r.delivery_place.as_deref(),
            line_items: items.len(),
            okpd2_codes: codes.join(";"),
        }
    }
}

pub fn write_csv<W: Write>(records: &[AuctionRecord], writer: W) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(ExportRow::from(record))
            .with_context(|| format!("write row for {}", record.url))?;
    }
    wtr.flush()?;
    Ok(records.len())
}

pub fn export_to_path(records: &[AuctionRecord], path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Could not create dir {:?}", parent))?;
    }
    let file = std::fs::File::create(path).with_context(|| format!("Could not create {:?}", path))?;
    let n = write_csv(records, file)?;
    info!("Exported {} auctions to {:?}", n, path);
    Ok(n)
}
