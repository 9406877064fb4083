//! Per-record crawl state.
//!
//! A [`Traversal`] owns one partially built auction and knows which page it
//! is waiting for. Feeding it that page with [`Traversal::advance`] merges
//! the page's fragment and yields the next step: another fetch, a finished
//! record, or a discard.
//!
//! ```text
//! Discovered → ItemFetched → (PlacerFetched)? → (PositionsFetched)* → Finalized
//! ```

use crate::models::{AccumulatingRecord, PurchasingPosition};
use crate::scraper::Page;
use crate::scraper::parsers::{ItemPage, parse_item_page, parse_placer_page, parse_positions_page};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discovered,
    ItemFetched,
    PlacerFetched,
    PositionsFetched,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Item,
    Placer,
    Positions,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: String,
    pub kind: PageKind,
}

#[derive(Debug)]
pub enum Transition {
    Fetch(Traversal, PageRequest),
    Finalize(AccumulatingRecord),
    /// Item page marked as already published; nothing is emitted.
    Discard,
}

#[derive(Debug)]
pub struct Traversal {
    stage: Stage,
    awaiting: PageKind,
    record: AccumulatingRecord,
    visited_positions: Vec<String>,
}

impl Traversal {
    /// Start a traversal for a discovered item URL.
    pub fn discovered(url: &str) -> (Self, PageRequest) {
        let traversal = Self {
            stage: Stage::Discovered,
            awaiting: PageKind::Item,
            record: AccumulatingRecord { url: url.to_string(), ..Default::default() },
            visited_positions: Vec::new(),
        };
        let request = PageRequest { url: url.to_string(), kind: PageKind::Item };
        (traversal, request)
    }

    #[cfg(test)]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[cfg(test)]
    pub fn awaiting(&self) -> PageKind {
        self.awaiting
    }

    #[cfg(test)]
    pub fn record(&self) -> &AccumulatingRecord {
        &self.record
    }

    /// Merge the awaited page and decide what comes next.
    pub fn advance(mut self, page: &Page) -> Transition {
        match self.awaiting {
            PageKind::Item => match parse_item_page(page) {
                ItemPage::AlreadyPublished => Transition::Discard,
                ItemPage::Record(record) => {
                    self.record = *record;
                    self.stage = Stage::ItemFetched;
                    match self.record.placer.url.clone() {
                        Some(url) => self.fetch(url, PageKind::Placer),
                        None => self.positions_or_finalize(),
                    }
                }
            },
            PageKind::Placer => {
                let profile = parse_placer_page(page);
                self.record.placer.merge_profile(profile);
                self.stage = Stage::PlacerFetched;
                self.positions_or_finalize()
            }
            PageKind::Positions => {
                let parsed = parse_positions_page(page, self.record.next_position_ordinal());
                if let Some(schema) = &parsed.schema {
                    debug!(
                        "positions: {} columns, {} residual, {} rows on {}",
                        schema.column_count(),
                        schema.residual_columns().count(),
                        parsed.positions.len(),
                        page.url
                    );
                }
                let existing = self.record.purchasing_positions.take();
                self.record.purchasing_positions = Some(merge_positions(existing, parsed.positions));
                self.stage = Stage::PositionsFetched;

                match parsed.next_page {
                    Some(next) if self.visited_positions.contains(&next) => {
                        warn!("positions: next page {} already visited, stopping", next);
                        self.finalize()
                    }
                    Some(next) => self.fetch(next, PageKind::Positions),
                    None => self.finalize(),
                }
            }
        }
    }

    /// The awaited page could not be fetched. Returns the partial record
    /// when there is one worth emitting.
    pub fn abandon(self, emit_partial: bool) -> Option<AccumulatingRecord> {
        match self.awaiting {
            PageKind::Item => None,
            _ if emit_partial => {
                info!("{:?} page unavailable, emitting partial record {}", self.awaiting, self.record.url);
                Some(self.record)
            }
            _ => None,
        }
    }

    fn positions_or_finalize(self) -> Transition {
        match self.record.purchasing_positions_url.clone() {
            Some(url) => self.fetch(url, PageKind::Positions),
            None => self.finalize(),
        }
    }

    fn fetch(mut self, url: String, kind: PageKind) -> Transition {
        debug!("{:?} → fetch {:?} {}", self.stage, kind, url);
        if kind == PageKind::Positions {
            self.visited_positions.push(url.clone());
        }
        self.awaiting = kind;
        Transition::Fetch(self, PageRequest { url, kind })
    }

    fn finalize(mut self) -> Transition {
        self.stage = Stage::Finalized;
        debug!("finalized {}", self.record.url);
        Transition::Finalize(self.record)
    }
}

/// Union of two position maps. On a key collision the incoming entry wins
/// and the conflict is logged.
pub fn merge_positions(
    existing: Option<BTreeMap<u32, PurchasingPosition>>,
    incoming: BTreeMap<u32, PurchasingPosition>,
) -> BTreeMap<u32, PurchasingPosition> {
    let mut merged = existing.unwrap_or_default();
    for (key, position) in incoming {
        if let Some(previous) = merged.insert(key, position) {
            warn!(
                "positions: ordinal {} seen twice, replacing {:?} with a later row",
                key, previous.name
            );
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::parsers::tests::{ITEM_HTML, ITEM_URL, PLACER_HTML, positions_html};

    const PLACER_URL: &str = "https://www.example.com/firms/acme-55/";
    const POSITIONS_URL: &str = "https://www.example.com/market/postavka-kabelya-2761308/positions";

    fn page(url: &str, html: &str) -> Page {
        Page { url: url.to_string(), html: html.to_string() }
    }

    fn expect_fetch(transition: Transition) -> (Traversal, PageRequest) {
        match transition {
            Transition::Fetch(t, r) => (t, r),
            other => panic!("expected fetch, got {other:?}"),
        }
    }

    fn position(name: &str) -> PurchasingPosition {
        PurchasingPosition { name: Some(name.to_string()), ..Default::default() }
    }

    #[test]
    fn test_item_without_links_finalizes() {
        let (traversal, request) = Traversal::discovered(ITEM_URL);
        assert_eq!(traversal.stage(), Stage::Discovered);
        assert_eq!(request.kind, PageKind::Item);

        let html = "<html><body><h1>Закупка № 1<div>Бумага</div></h1></body></html>";
        match traversal.advance(&page(ITEM_URL, html)) {
            Transition::Finalize(record) => assert_eq!(record.title.as_deref(), Some("Бумага")),
            other => panic!("expected finalize, got {other:?}"),
        }
    }

    #[test]
    fn test_full_walk_item_placer_positions() {
        let (traversal, _) = Traversal::discovered(ITEM_URL);

        let (traversal, request) = expect_fetch(traversal.advance(&page(ITEM_URL, ITEM_HTML)));
        assert_eq!(traversal.stage(), Stage::ItemFetched);
        assert_eq!(request, PageRequest { url: PLACER_URL.into(), kind: PageKind::Placer });

        let (traversal, request) = expect_fetch(traversal.advance(&page(PLACER_URL, PLACER_HTML)));
        assert_eq!(traversal.stage(), Stage::PlacerFetched);
        assert_eq!(traversal.record().placer.inn.as_deref(), Some("7701234567"));
        assert_eq!(traversal.record().placer.url.as_deref(), Some(PLACER_URL));
        assert_eq!(request.kind, PageKind::Positions);

        let html = positions_html(&[("1", "Кабель")], None);
        match traversal.advance(&page(POSITIONS_URL, &html)) {
            Transition::Finalize(record) => {
                let positions = record.purchasing_positions.unwrap();
                assert_eq!(positions.len(), 1);
                assert_eq!(positions[&1].name.as_deref(), Some("Кабель"));
            }
            other => panic!("expected finalize, got {other:?}"),
        }
    }

    #[test]
    fn test_item_without_placer_goes_to_positions() {
        let html = format!(
            r#"<html><body><h1>Закупка № 9</h1><a href="{POSITIONS_URL}">Закупочные позиции</a></body></html>"#
        );
        let (traversal, _) = Traversal::discovered(ITEM_URL);
        let (traversal, request) = expect_fetch(traversal.advance(&page(ITEM_URL, &html)));
        assert_eq!(request, PageRequest { url: POSITIONS_URL.into(), kind: PageKind::Positions });
        assert_eq!(traversal.awaiting(), PageKind::Positions);
    }

    #[test]
    fn test_already_published_is_discarded() {
        let (traversal, _) = Traversal::discovered(ITEM_URL);
        let html = r#"<div class="common_block">Информация выгружена в ЕИС</div>"#;
        assert!(matches!(traversal.advance(&page(ITEM_URL, html)), Transition::Discard));
    }

    #[test]
    fn test_positions_loop_stops_on_revisit() {
        let (traversal, _) = Traversal::discovered(ITEM_URL);
        let html = format!(
            r#"<html><body><h1>Закупка № 9</h1><a href="{POSITIONS_URL}">Закупочные позиции</a></body></html>"#
        );
        let (traversal, _) = expect_fetch(traversal.advance(&page(ITEM_URL, &html)));

        let looping = positions_html(&[("1", "Кабель")], Some(POSITIONS_URL));
        assert!(matches!(
            traversal.advance(&page(POSITIONS_URL, &looping)),
            Transition::Finalize(_)
        ));
    }

    #[test]
    fn test_abandon_policy() {
        let (traversal, _) = Traversal::discovered(ITEM_URL);
        assert!(traversal.abandon(true).is_none());

        let (traversal, _) = Traversal::discovered(ITEM_URL);
        let (traversal, _) = expect_fetch(traversal.advance(&page(ITEM_URL, ITEM_HTML)));
        let record = traversal.abandon(true).unwrap();
        assert_eq!(record.id, Some(2761308));

        let (traversal, _) = Traversal::discovered(ITEM_URL);
        let (traversal, _) = expect_fetch(traversal.advance(&page(ITEM_URL, ITEM_HTML)));
        assert!(traversal.abandon(false).is_none());
    }

    #[test]
    fn test_merge_disjoint_keys() {
        let first: BTreeMap<u32, PurchasingPosition> =
            [(1, position("a")), (2, position("b"))].into_iter().collect();
        let second: BTreeMap<u32, PurchasingPosition> =
            [(3, position("c"))].into_iter().collect();

        let merged = merge_positions(Some(first.clone()), second.clone());
        assert_eq!(merged.len(), first.len() + second.len());
        assert_eq!(merged[&1], first[&1]);
        assert_eq!(merged[&2], first[&2]);
        assert_eq!(merged[&3], second[&3]);
    }

    #[test]
    fn test_merge_collision_later_wins() {
        let first: BTreeMap<u32, PurchasingPosition> = [(1, position("old"))].into_iter().collect();
        let second: BTreeMap<u32, PurchasingPosition> = [(1, position("new"))].into_iter().collect();
        let merged = merge_positions(Some(first), second);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[&1].name.as_deref(), Some("new"));

        assert!(merge_positions(None, BTreeMap::new()).is_empty());
    }
}
