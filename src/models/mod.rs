use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Shared value types ────────────────────────────────────────────────────────

/// A classification code and its human-readable label (OKPD2 / OKVED2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    pub code: String,
    pub label: String,
}

/// Lot price as found on the item page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PriceValue {
    Parsed(f64),
    /// Price text present but it did not reduce to a number.
    PartialText(String),
    #[default]
    Absent,
}

impl PriceValue {
    pub fn amount(&self) -> Option<f64> {
        match self {
            PriceValue::Parsed(v) => Some(*v),
            _ => None,
        }
    }

    pub fn raw_text(&self) -> Option<&str> {
        match self {
            PriceValue::PartialText(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Contacts {
    pub responsible_person: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
}

impl Contacts {
    pub fn is_empty(&self) -> bool {
        self.responsible_person.is_none() && self.email.is_none() && self.phone_number.is_none()
    }
}

// ── Accumulating record ───────────────────────────────────────────────────────

/// Raw date strings from the item page, in site format ("15.08.2021 10:00").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DatesBundle {
    pub publication: Option<String>,
    /// Falls back to `publication` when the page has no separate value.
    pub submission_open: Option<String>,
    pub submission_unsealing: Option<String>,
    pub submission_qualified: Option<String>,
    pub submission_close: Option<String>,
    pub last_update: Option<String>,
}

/// Organizer ("placer") data. Address, contacts and URL come from the item
/// page; identity fields come from the organizer's profile page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct OrganizerInfo {
    pub url: Option<String>,
    pub post_address: Option<String>,
    pub fact_address: Option<String>,
    pub contacts: Option<Contacts>,

    pub short_name: Option<String>,
    pub full_name: Option<String>,
    pub inn: Option<String>,
    pub kpp: Option<String>,
    pub okpo: Option<String>,
    pub ogrn: Option<String>,
}

/// Identity fields read from the organizer profile page.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlacerProfile {
    pub short_name: Option<String>,
    pub full_name: Option<String>,
    pub inn: Option<String>,
    pub kpp: Option<String>,
    pub okpo: Option<String>,
    pub ogrn: Option<String>,
}

impl OrganizerInfo {
    /// Fold profile-page fields in. Item-page fields are left untouched.
    pub fn merge_profile(&mut self, profile: PlacerProfile) {
        self.short_name = profile.short_name;
        self.full_name = profile.full_name;
        self.inn = profile.inn;
        self.kpp = profile.kpp;
        self.okpo = profile.okpo;
        self.ogrn = profile.ogrn;
    }
}

/// One row of the purchasing-positions table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PurchasingPosition {
    pub ordinal_number: Option<String>,
    pub name: Option<String>,
    pub qty: Option<String>,
    pub okpd2: Option<Classification>,
    pub okved2: Option<Classification>,
    /// Header label → cell text for columns outside the known fields.
    pub additional_info: BTreeMap<String, String>,
}

/// Partial auction built up across the item, placer and positions pages.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AccumulatingRecord {
    pub id: Option<u64>,
    pub purchase_code_name: Option<String>,
    pub title: Option<String>,
    pub okpd2: Option<Classification>,
    pub okved2: Option<Classification>,
    pub lot_price: PriceValue,
    pub currency: Option<String>,
    pub dates: DatesBundle,
    pub placer: OrganizerInfo,
    pub delivery_place: Option<String>,
    pub purchasing_positions: Option<BTreeMap<u32, PurchasingPosition>>,
    pub purchasing_positions_url: Option<String>,
    pub additional_info: Option<BTreeMap<String, String>>,
    pub url: String,
}

impl AccumulatingRecord {
    /// Ordinal the next positions page should start numbering from.
    pub fn next_position_ordinal(&self) -> u32 {
        self.purchasing_positions
            .as_ref()
            .and_then(|p| p.keys().next_back().copied())
            .map_or(1, |last| last + 1)
    }
}

// ── Output entities ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Organization {
    pub short_name: Option<String>,
    pub full_name: Option<String>,
    pub inn: Option<String>,
    pub kpp: Option<String>,
    pub ogrn: Option<String>,
    pub okpo: Option<String>,
    pub legal_address: Option<String>,
    pub postal_address: Option<String>,
    pub okato: Option<String>,
    pub okopf: Option<String>,
    pub okopf_name: Option<String>,
    pub iko: Option<String>,
    pub customer_registration_date: Option<NaiveDateTime>,
    pub customer_registration_date_specified: Option<bool>,
    pub additional_info: Option<BTreeMap<String, String>>,
    pub contacts: Option<Contacts>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItem {
    pub ordinal_number: Option<String>,
    pub name: Option<String>,
    pub qty: Option<String>,
    pub okpd2_code: Option<String>,
    pub okpd2_name: Option<String>,
    pub okved2_code: Option<String>,
    pub okved2_name: Option<String>,
    pub okei_code: Option<String>,
    pub okei_name: Option<String>,
    pub additional_info: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuctionRecord {
    pub external_id: Option<u64>,
    pub url: String,
    pub purchase_code_name: Option<String>,
    pub name: Option<String>,
    pub subject: Option<String>,
    pub publication_date_time: Option<NaiveDateTime>,
    pub submission_open_date_time: Option<NaiveDateTime>,
    pub submission_unsealing_date_time: Option<NaiveDateTime>,
    pub submission_qualified_date_time: Option<NaiveDateTime>,
    pub submission_close_date_time: Option<NaiveDateTime>,
    pub last_update_date_time: Option<NaiveDateTime>,
    pub initial_sum: PriceValue,
    pub currency_name: Option<String>,
    pub currency_code: Option<String>,
    pub joint_purchase: bool,
    pub placer: Organization,
    pub customer: Organization,
    pub delivery_place: Option<String>,
    pub lot_items: Option<Vec<LineItem>>,
    pub document_list: Option<Vec<String>>,
    pub additional_info: Option<BTreeMap<String, String>>,
}
