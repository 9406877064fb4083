use crate::models::{
    AccumulatingRecord, AuctionRecord, Classification, LineItem, Organization, OrganizerInfo,
    PurchasingPosition,
};
use crate::scraper::cleaner::parse_datetime;
use chrono::NaiveDateTime;
use tracing::warn;

/// Turn a finalized accumulating record into the output entity.
pub fn materialize(record: AccumulatingRecord) -> AuctionRecord {
    let url = record.url.as_str();
    let dates = &record.dates;
    let organization = organization(&record.placer);

    AuctionRecord {
        external_id: record.id,
        purchase_code_name: record.purchase_code_name.clone(),
        name: record.title.clone(),
        subject: record.title.clone(),
        publication_date_time: timestamp(dates.publication.as_deref(), "publication", url),
        submission_open_date_time: timestamp(dates.submission_open.as_deref(), "submission_open", url),
        submission_unsealing_date_time: timestamp(
            dates.submission_unsealing.as_deref(),
            "submission_unsealing",
            url,
        ),
        submission_qualified_date_time: timestamp(
            dates.submission_qualified.as_deref(),
            "submission_qualified",
            url,
        ),
        submission_close_date_time: timestamp(dates.submission_close.as_deref(), "submission_close", url),
        last_update_date_time: timestamp(dates.last_update.as_deref(), "last_update", url),
        initial_sum: record.lot_price.clone(),
        currency_name: record.currency.clone(),
        currency_code: None,
        joint_purchase: false,
        placer: organization.clone(),
        customer: organization,
        delivery_place: record.delivery_place.clone(),
        lot_items: line_items(&record),
        document_list: None,
        additional_info: record.additional_info.clone(),
        url: record.url,
    }
}

fn timestamp(raw: Option<&str>, field: &str, url: &str) -> Option<NaiveDateTime> {
    let raw = raw?;
    let parsed = parse_datetime(raw);
    if parsed.is_none() {
        warn!("{}: unparsable date {:?} on {}", field, raw, url);
    }
    parsed
}

fn organization(placer: &OrganizerInfo) -> Organization {
    Organization {
        short_name: placer.short_name.clone(),
        full_name: placer.full_name.clone(),
        inn: placer.inn.clone(),
        kpp: placer.kpp.clone(),
        ogrn: placer.ogrn.clone(),
        okpo: placer.okpo.clone(),
        // Output addresses keep the site's pairing: the "post address" row
        // is the legal address, the "fact address" row the postal one.
        legal_address: placer.post_address.clone(),
        postal_address: placer.fact_address.clone(),
        okato: None,
        okopf: None,
        okopf_name: None,
        iko: None,
        customer_registration_date: None,
        customer_registration_date_specified: None,
        additional_info: None,
        contacts: placer.contacts.clone(),
        url: placer.url.clone(),
    }
}

/// Line items in ordinal order, or `None` when no positions were found.
fn line_items(record: &AccumulatingRecord) -> Option<Vec<LineItem>> {
    let positions = record.purchasing_positions.as_ref().filter(|p| !p.is_empty())?;
    Some(
        positions
            .values()
            .map(|p| line_item(p, record.okpd2.as_ref(), record.okved2.as_ref()))
            .collect(),
    )
}

/// Missing position classifications fall back to the item-level ones,
/// each independently.
fn line_item(
    position: &PurchasingPosition,
    okpd2_default: Option<&Classification>,
    okved2_default: Option<&Classification>,
) -> LineItem {
    let okpd2 = position.okpd2.as_ref().or(okpd2_default);
    let okved2 = position.okved2.as_ref().or(okved2_default);

    LineItem {
        ordinal_number: position.ordinal_number.clone(),
        name: position.name.clone(),
        qty: position.qty.clone(),
        okpd2_code: okpd2.map(|c| c.code.clone()),
        okpd2_name: okpd2.map(|c| c.label.clone()),
        okved2_code: okved2.map(|c| c.code.clone()),
        okved2_name: okved2.map(|c| c.label.clone()),
        okei_code: None,
        okei_name: None,
        additional_info: position.additional_info.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contacts, DatesBundle, PriceValue};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn class(code: &str, label: &str) -> Classification {
        Classification { code: code.into(), label: label.into() }
    }

    fn record() -> AccumulatingRecord {
        AccumulatingRecord {
            id: Some(42),
            title: Some("Поставка бумаги".into()),
            okpd2: Some(class("17.12", "Бумага")),
            okved2: Some(class("46.49", "Торговля")),
            lot_price: PriceValue::Parsed(1500.0),
            dates: DatesBundle {
                publication: Some("15.08.2021 10:00".into()),
                submission_close: Some("скоро".into()),
                ..Default::default()
            },
            placer: OrganizerInfo {
                inn: Some("7701234567".into()),
                post_address: Some("101000, Москва".into()),
                fact_address: Some("Москва, ул. Ленина, 1".into()),
                contacts: Some(Contacts { email: Some("a@b.ru".into()), ..Default::default() }),
                ..Default::default()
            },
            url: "https://www.example.com/market/bumaga-42/".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_scalars_and_organization() {
        let out = materialize(record());
        assert_eq!(out.external_id, Some(42));
        assert_eq!(out.name, out.subject);
        assert_eq!(out.initial_sum, PriceValue::Parsed(1500.0));
        assert!(!out.joint_purchase);
        assert_eq!(out.placer, out.customer);
        assert_eq!(out.placer.inn.as_deref(), Some("7701234567"));
        assert_eq!(out.placer.legal_address.as_deref(), Some("101000, Москва"));
        assert_eq!(out.placer.postal_address.as_deref(), Some("Москва, ул. Ленина, 1"));
        assert_eq!(out.placer.contacts.unwrap().email.as_deref(), Some("a@b.ru"));
        assert_eq!(out.lot_items, None);
    }

    #[test]
    fn test_dates_parsed_or_dropped() {
        let out = materialize(record());
        let expected = NaiveDate::from_ymd_opt(2021, 8, 15)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert_eq!(out.publication_date_time, Some(expected));
        assert_eq!(out.submission_close_date_time, None);
        assert_eq!(out.submission_open_date_time, None);
    }

    #[test]
    fn test_line_items_fall_back_independently() {
        let mut rec = record();
        let mut positions = BTreeMap::new();
        positions.insert(
            2,
            PurchasingPosition { name: Some("second".into()), ..Default::default() },
        );
        positions.insert(
            1,
            PurchasingPosition {
                name: Some("first".into()),
                okpd2: Some(class("17.23", "Канцтовары")),
                ..Default::default()
            },
        );
        rec.purchasing_positions = Some(positions);

        let items = materialize(rec).lot_items.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name.as_deref(), Some("first"));
        assert_eq!(items[0].okpd2_code.as_deref(), Some("17.23"));
        assert_eq!(items[0].okved2_code.as_deref(), Some("46.49"));
        assert_eq!(items[1].name.as_deref(), Some("second"));
        assert_eq!(items[1].okpd2_name.as_deref(), Some("Бумага"));
        assert_eq!(items[1].okved2_name.as_deref(), Some("Торговля"));
    }

    #[test]
    fn test_empty_positions_yield_no_line_items() {
        let mut rec = record();
        rec.purchasing_positions = Some(BTreeMap::new());
        assert_eq!(materialize(rec).lot_items, None);
    }
}
