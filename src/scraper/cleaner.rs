use crate::models::PriceValue;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, warn};
use url::Url;

/// Label text the site shows instead of a price.
pub const PRICE_NOT_SPECIFIED: &str = "без указания цены";

/// Currency names the price is cut at, tried in order.
const CURRENCY_SUFFIXES: [&str; 3] = ["руб", "грн", "тенге"];

/// Currency tokens removed anywhere in the price text.
const CURRENCY_TOKENS: [&str; 9] = ["EUR", "USD", "лир", "тенге", "BYN", "GBP", "%", "AUD", "\u{a0}"];

// ── Text ──────────────────────────────────────────────────────────────────────

/// Collapse runs of whitespace and trim, like XPath `normalize-space()`.
pub fn normalize_space(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `None` for blank text, the normalized text otherwise.
pub fn non_blank(s: &str) -> Option<String> {
    let s = normalize_space(s);
    if s.is_empty() { None } else { Some(s) }
}

/// Keep only ASCII digits. "ИНН 123-45" → "12345"
pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Pass-through form of [`digits_only`]: a missing value stays missing.
pub fn digits_only_opt(value: Option<String>) -> Option<String> {
    value.map(|v| digits_only(&v))
}

// ── Identifiers & URLs ────────────────────────────────────────────────────────

/// Drop the `/?error…` tail the site appends after failed form posts.
pub fn canonical_url(url: &str) -> String {
    url.split("/?error").next().unwrap_or(url).to_string()
}

/// Numeric id from an item URL. ".../postavka-materialov-123456/" → 123456
pub fn parse_identifier(url: &str) -> Option<u64> {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());

    let Some(segment) = path.split('/').rev().find(|s| !s.is_empty()) else {
        warn!("parse_identifier: no path segment in {}", url);
        return None;
    };

    let suffix = match segment.rsplit_once('-') {
        Some((_, suffix)) => suffix,
        None => {
            debug!("parse_identifier: no hyphen in {:?}, using whole segment ({})", segment, url);
            segment
        }
    };

    let digits = digits_only(suffix);
    if digits.is_empty() {
        warn!("parse_identifier: suffix {:?} has no digits ({})", suffix, url);
        return None;
    }

    match digits.parse() {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("parse_identifier: {:?} is not a valid id ({}): {}", digits, url, e);
            None
        }
    }
}

// ── Prices ────────────────────────────────────────────────────────────────────

/// Parse the lot price cell.
/// "1 234,56 руб." → Parsed(1234.56) | "Без указания цены" → Absent
pub fn parse_price(label: Option<&str>, bold: Option<&str>) -> PriceValue {
    if let Some(label) = label {
        if label.trim().to_lowercase() == PRICE_NOT_SPECIFIED {
            return PriceValue::Absent;
        }
    }

    let Some(bold) = bold.map(str::trim).filter(|b| !b.is_empty()) else {
        return PriceValue::Absent;
    };

    let mut cleaned = bold.to_string();
    for suffix in CURRENCY_SUFFIXES {
        cleaned = cleaned.trim().split(suffix).next().unwrap_or_default().to_string();
    }
    for token in CURRENCY_TOKENS {
        cleaned = cleaned.replace(token, "");
    }
    cleaned = cleaned.replace(' ', "");

    let digits_check = cleaned.replace([',', '.'], "");
    if !digits_check.is_empty() && digits_check.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(v) = cleaned.replace(',', ".").parse::<f64>() {
            return PriceValue::Parsed(v);
        }
    }

    warn!("parse_price: could not convert {:?} (raw {:?})", cleaned, bold);
    PriceValue::PartialText(cleaned)
}

// ── Dates ─────────────────────────────────────────────────────────────────────

/// Parse site timestamps: "15.08.2021 10:00", "15.08.2021 10:00:00 (МСК)", "15.08.2021"
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.split('(').next().unwrap_or(s).trim();
    if s.is_empty() {
        return None;
    }

    for fmt in ["%d.%m.%Y %H:%M", "%d.%m.%Y %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%d.%m.%Y")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
