use crate::models::{
    AccumulatingRecord, Classification, Contacts, DatesBundle, OrganizerInfo, PlacerProfile,
    PriceValue, PurchasingPosition,
};
use crate::scraper::Page;
use crate::scraper::cleaner::{
    canonical_url, digits_only_opt, non_blank, parse_identifier, parse_price,
};
use crate::scraper::dom::{
    attr, child_elements, children_named, doc_first, find_containing, following_siblings,
    full_text, nth_child_named, own_text, own_text_nodes, select_all, select_first,
};
use crate::scraper::schema::{Column, KnownField, TableSchema};
use crate::utils::resolve_url;
use scraper::{ElementRef, Html};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

const POSITIONS_LINK_TEXT: &str = "Закупочные позиции";
const NEXT_PAGE_TEXT: &str = "Следующая страница";
const ADDITIONAL_INFO_TEXT: &str = "Дополнительная информация";
const LAST_EDIT_TEXT: &str = "Дата последнего редактирования:";
const CLOSED_AUCTION_TEXT: &str = "Закрытый";

fn text_of(el: ElementRef<'_>) -> Option<String> {
    non_blank(&own_text(el))
}

/// `td[2]` of the row with the given id.
fn row_cell<'a>(doc: &'a Html, id: &str) -> Option<ElementRef<'a>> {
    let row = doc_first(doc, &format!("#{id}"))?;
    nth_child_named(row, "td", 2)
}

fn row_text(doc: &Html, id: &str) -> Option<String> {
    row_cell(doc, id).and_then(text_of)
}

fn link_href(anchor: ElementRef<'_>, base: &str) -> Option<String> {
    attr(anchor, "href").and_then(|href| resolve_url(base, &href))
}

// ── Item page ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ItemPage {
    /// The auction is already exported to another registry; skip it.
    AlreadyPublished,
    Record(Box<AccumulatingRecord>),
}

pub fn parse_item_page(page: &Page) -> ItemPage {
    let doc = Html::parse_document(&page.html);

    if doc_first(&doc, r#"div[class="common_block"]"#).is_some() {
        info!("Already published elsewhere, skipping {}", page.url);
        return ItemPage::AlreadyPublished;
    }

    let url = canonical_url(&page.url);

    let record = AccumulatingRecord {
        id: parse_identifier(&url),
        purchase_code_name: parse_code_name(&doc, &url),
        title: parse_title(&doc, &url),
        okpd2: parse_classification(&doc, "okpd2", &url),
        okved2: parse_classification(&doc, "okved2", &url),
        lot_price: parse_lot_price(&doc),
        currency: row_text(&doc, "trade-info-lot-price-currency"),
        dates: parse_dates(&doc),
        placer: parse_organizer(&doc, &page.url),
        delivery_place: row_text(&doc, "trade_info_address"),
        purchasing_positions: None,
        purchasing_positions_url: find_containing(doc.root_element(), "a", POSITIONS_LINK_TEXT)
            .and_then(|a| link_href(a, &page.url)),
        additional_info: parse_additional_info(&doc, &url),
        url,
    };

    ItemPage::Record(Box::new(record))
}

fn parse_code_name(doc: &Html, url: &str) -> Option<String> {
    let Some(title) = doc_first(doc, "h1").and_then(text_of) else {
        info!("code name: no h1 on {}", url);
        return None;
    };
    title.split(" №").next().and_then(non_blank)
}

fn parse_title(doc: &Html, url: &str) -> Option<String> {
    let title = doc_first(doc, "h1 > div").and_then(text_of);
    if title.is_none() {
        info!("title: no h1 > div on {}", url);
    }
    title
}

fn parse_classification(doc: &Html, name: &str, url: &str) -> Option<Classification> {
    let block = doc_first(doc, &format!("#trade-info-{name}"))?;
    parse_code_label(block, name, url)
}

/// Code + label from a `#trade-info-okpd2`-style row. The expandable
/// (multi-value) rendering is checked before the plain one.
pub fn parse_code_label(block: ElementRef<'_>, name: &str, url: &str) -> Option<Classification> {
    let cell = nth_child_named(block, "td", 2)?;

    let expandable = select_first(cell, r#"[class="expandable-text full"] > [class="value"] > div"#);
    let (variant, node) = match expandable {
        Some(node) => ("expandable", node),
        None => match children_named(cell, "div").next() {
            Some(node) => ("single", node),
            None => {
                debug!("{}: no code block on {}", name, url);
                return None;
            }
        },
    };

    let code = children_named(node, "b").next().map(own_text).unwrap_or_default();
    let label = own_text(node);

    if code.is_empty() || label.is_empty() {
        info!(
            "{}: incomplete {} block, code = {:?}, label = {:?} ({})",
            name, variant, code, label, url
        );
        return None;
    }
    Some(Classification { code, label })
}

fn parse_lot_price(doc: &Html) -> PriceValue {
    let block = doc_first(doc, "#trade-info-lot-price");
    let label = block
        .and_then(|b| select_first(b, "td:nth-of-type(2)"))
        .map(own_text);
    let bold = block.and_then(|b| select_first(b, "b")).map(own_text);
    parse_price(label.as_deref(), bold.as_deref())
}

fn parse_dates(doc: &Html) -> DatesBundle {
    let publication = row_cell(doc, "trade_info_date_begin").and_then(|cell| {
        children_named(cell, "span")
            .next()
            .and_then(text_of)
            .or_else(|| text_of(cell))
    });

    let submission_open = row_text(doc, "trade_info_date_start").or_else(|| publication.clone());

    let last_update = find_containing(doc.root_element(), "*", LAST_EDIT_TEXT)
        .and_then(|label| following_siblings(label).next())
        .and_then(text_of);

    DatesBundle {
        publication,
        submission_open,
        submission_unsealing: row_text(doc, "trade_info_date_unsealing"),
        submission_qualified: row_text(doc, "trade_info_date_qualified"),
        submission_close: row_text(doc, "trade_info_date_end"),
        last_update,
    }
}

fn parse_organizer(doc: &Html, base: &str) -> OrganizerInfo {
    let url = row_cell(doc, "trade-info-organizer-name")
        .and_then(|cell| children_named(cell, "a").next())
        .and_then(|a| link_href(a, base));

    let contacts = Contacts {
        responsible_person: row_text(doc, "trade-info-contact-person"),
        email: row_cell(doc, "trade-info-organizer-email")
            .and_then(|cell| children_named(cell, "a").next())
            .and_then(text_of),
        phone_number: row_cell(doc, "trade-info-organizer-phone")
            .and_then(|cell| children_named(cell, "noindex").next())
            .and_then(text_of),
    };

    OrganizerInfo {
        url,
        post_address: row_text(doc, "trade-info-organizer-post-address"),
        fact_address: row_text(doc, "trade-info-organizer-fact-address"),
        contacts: if contacts.is_empty() { None } else { Some(contacts) },
        ..Default::default()
    }
}

/// Rows of the nested tables that follow the "additional information" row.
fn additional_info_rows<'a>(rows: &[ElementRef<'a>]) -> Vec<ElementRef<'a>> {
    let Some(marker) = rows.iter().position(|row| {
        children_named(*row, "td").any(|td| own_text(td).contains(ADDITIONAL_INFO_TEXT))
    }) else {
        return Vec::new();
    };

    rows[marker + 1..]
        .iter()
        .flat_map(|row| children_named(*row, "td"))
        .flat_map(|td| children_named(td, "table"))
        .flat_map(|table| select_all(table, "tr"))
        .collect()
}

fn parse_additional_info(doc: &Html, url: &str) -> Option<BTreeMap<String, String>> {
    let table = doc_first(doc, "#auction_info_td > table")?;

    let tbody_rows: Vec<_> = children_named(table, "tbody")
        .flat_map(|tbody| children_named(tbody, "tr"))
        .collect();
    let mut rows = additional_info_rows(&tbody_rows);
    // html5ever wraps bare rows in tbody; the direct path covers trees built without that fix-up.
    if rows.is_empty() {
        let bare_rows: Vec<_> = children_named(table, "tr").collect();
        rows = additional_info_rows(&bare_rows);
    }
    if rows.is_empty() {
        debug!("additional info: no section on {}", url);
        return None;
    }

    let mut info = BTreeMap::new();
    for row in rows {
        let cells: Vec<_> = children_named(row, "td").collect();

        let key = cells.first().and_then(|td| {
            children_named(*td, "span")
                .next()
                .and_then(text_of)
                .or_else(|| text_of(*td))
        });
        let value = cells.get(1).and_then(|td| text_of(*td));

        match (key, value) {
            (Some(key), Some(value)) => {
                info.insert(key, value);
            }
            (Some(_), None) => {
                // Bold label with the value spread over several text nodes.
                let Some(label) = cells
                    .iter()
                    .find_map(|td| children_named(*td, "b").next())
                    .and_then(text_of)
                else {
                    continue;
                };
                let fragments: Vec<String> = cells.iter().flat_map(|td| own_text_nodes(*td)).collect();
                if fragments.len() > 1 {
                    info.insert(label, fragments.join(" "));
                }
            }
            _ => {}
        }
    }
    Some(info)
}

// ── Placer (organizer profile) page ───────────────────────────────────────────

pub fn parse_placer_page(page: &Page) -> PlacerProfile {
    let doc = Html::parse_document(&page.html);

    let Some(tbody) = doc_first(&doc, r#"[class="box primaryBg menuBox"]"#)
        .and_then(|profile| select_first(profile, "tbody"))
    else {
        warn!("placer: no profile table on {}", page.url);
        return PlacerProfile::default();
    };

    let lookup = |label: &str| -> Option<String> {
        let cell = children_named(tbody, "tr")
            .flat_map(|tr| children_named(tr, "td"))
            .find(|td| own_text(*td).contains(label))?;
        following_siblings(cell)
            .find(|s| s.value().name() == "td")
            .and_then(text_of)
    };
    let registration = |label: &str| digits_only_opt(lookup(label)).filter(|v| !v.is_empty());

    let profile = PlacerProfile {
        short_name: lookup("Краткое наименование"),
        full_name: lookup("Полное наименование"),
        inn: registration("ИНН"),
        kpp: registration("КПП"),
        okpo: registration("ОКПО"),
        ogrn: registration("ОГРН"),
    };

    if profile.short_name.is_none() && profile.full_name.is_none() {
        info!("placer: no organizer name on {}", page.url);
    }
    profile
}

// ── Purchasing positions page ─────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PositionsPage {
    pub schema: Option<TableSchema>,
    pub positions: BTreeMap<u32, PurchasingPosition>,
    pub next_page: Option<String>,
}

/// Parse one page of the positions table. Rows are keyed from `first_ordinal`.
pub fn parse_positions_page(page: &Page, first_ordinal: u32) -> PositionsPage {
    let doc = Html::parse_document(&page.html);

    let next_page = find_containing(doc.root_element(), "a", NEXT_PAGE_TEXT)
        .and_then(|a| link_href(a, &page.url));

    let Some(table) = doc_first(&doc, "div.wideTable-wrap") else {
        warn!("positions: no table on {}", page.url);
        return PositionsPage { next_page, ..Default::default() };
    };
    let Some(schema) = TableSchema::infer(table) else {
        warn!("positions: empty table on {}", page.url);
        return PositionsPage { next_page, ..Default::default() };
    };

    let rows: Vec<_> = select_first(table, "tr.thead")
        .map(|header| {
            following_siblings(header)
                .filter(|s| s.value().name() == "tr")
                .collect()
        })
        .unwrap_or_default();

    let mut positions = BTreeMap::new();
    for (ordinal, row) in (first_ordinal..).zip(rows) {
        positions.insert(ordinal, parse_position_row(row, &schema, &page.url));
    }

    debug!("positions: {} rows on {}", positions.len(), page.url);
    PositionsPage { schema: Some(schema), positions, next_page }
}

fn parse_position_row(row: ElementRef<'_>, schema: &TableSchema, url: &str) -> PurchasingPosition {
    let mut position = PurchasingPosition::default();

    for (i, cell) in children_named(row, "td").enumerate() {
        let index = i + 1;
        match schema.column(index) {
            Some(Column::Residual(label)) => {
                position.additional_info.insert(label.clone(), own_text(cell));
            }
            Some(Column::Known(field)) if field.is_classification() => {
                let value = classification_cell(cell);
                match field {
                    KnownField::Okpd2 => position.okpd2 = value,
                    _ => position.okved2 = value,
                }
            }
            Some(Column::Known(field)) => {
                let value = text_of(cell);
                match field {
                    KnownField::OrdinalNumber => position.ordinal_number = value,
                    KnownField::Name => position.name = value,
                    _ => position.qty = value,
                }
            }
            None => debug!("positions: cell {} beyond {} header columns ({})", index, schema.column_count(), url),
        }
    }
    position
}

/// Classification inside a table cell: code in `<b>`, label as the text of
/// the cell's first child element.
fn classification_cell(cell: ElementRef<'_>) -> Option<Classification> {
    let code = select_first(cell, "b").map(own_text).unwrap_or_default();
    let label = child_elements(cell).next().map(own_text).unwrap_or_default();
    if code.is_empty() && label.is_empty() {
        return None;
    }
    Some(Classification { code, label })
}

// ── Listing (search results) page ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ListingPage {
    pub item_urls: Vec<String>,
    pub next_page: Option<String>,
}

/// Item links from a search results page. Closed auctions can't be viewed
/// and are left out.
pub fn parse_listing_page(page: &Page) -> ListingPage {
    let doc = Html::parse_document(&page.html);

    let item_urls = select_all(doc.root_element(), "a.search-results-title")
        .into_iter()
        .filter(|a| !full_text(*a).contains(CLOSED_AUCTION_TEXT))
        .filter_map(|a| link_href(a, &page.url))
        .collect();

    let next_page = find_containing(doc.root_element(), "a", NEXT_PAGE_TEXT)
        .and_then(|a| link_href(a, &page.url));

    ListingPage { item_urls, next_page }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const ITEM_URL: &str = "https://www.example.com/market/postavka-kabelya-2761308/";

    pub const ITEM_HTML: &str = r#"<html><body>
        <h1>Запрос предложений № 2761308<div>Поставка кабеля</div></h1>
        <table>
          <tr id="trade-info-okpd2"><td>ОКПД2:</td><td><div><b>27.32</b> Провода и кабели электронные</div></td></tr>
          <tr id="trade-info-okved2"><td>ОКВЭД2:</td><td>
            <div class="expandable-text full"><div class="value"><div><b>46.69</b> Торговля оптовая</div></div></div>
          </td></tr>
          <tr id="trade-info-lot-price"><td>Цена:</td><td><b>1 234 567,89 руб.</b></td></tr>
          <tr id="trade-info-lot-price-currency"><td>Валюта:</td><td>Российский рубль</td></tr>
          <tr id="trade_info_date_begin"><td>Дата публикации:</td><td><span>15.08.2021 10:00</span></td></tr>
          <tr id="trade_info_date_end"><td>Окончание:</td><td>25.08.2021 18:00</td></tr>
          <tr id="trade_info_address"><td>Место поставки:</td><td>  г. Москва,
              ул. Ленина, 1 </td></tr>
          <tr id="trade-info-organizer-name"><td>Организатор:</td><td><a href="/firms/acme-55/">ООО Акме</a></td></tr>
          <tr id="trade-info-organizer-post-address"><td>Почтовый адрес:</td><td>101000, Москва</td></tr>
          <tr id="trade-info-contact-person"><td>Контактное лицо:</td><td>Иванов И.И.</td></tr>
          <tr id="trade-info-organizer-email"><td>Email:</td><td><a href="mailto:a@b.ru">a@b.ru</a></td></tr>
          <tr id="trade-info-organizer-phone"><td>Телефон:</td><td><noindex>+7 495 000-00-00</noindex></td></tr>
        </table>
        <p><span>Дата последнего редактирования:</span><span>16.08.2021 09:15</span></p>
        <a href="/market/postavka-kabelya-2761308/positions">Закупочные позиции</a>
        <div id="auction_info_td"><table><tbody>
          <tr><td>Дополнительная информация</td></tr>
          <tr><td><table>
            <tr><td><span>Условия оплаты</span></td><td>30 дней</td></tr>
            <tr><td>Срок поставки</td><td>до 01.10.2021</td></tr>
            <tr><td><b>Примечание</b> поставка  частями</td><td> </td><td>по графику</td></tr>
            <tr><td><b>Пусто</b> один</td><td></td></tr>
          </table></td></tr>
        </tbody></table></div>
    </body></html>"#;

    pub const PLACER_HTML: &str = r#"<html><body>
        <div class="box primaryBg menuBox"><table><tbody>
          <tr><td>Краткое наименование</td><td>ООО Акме</td></tr>
          <tr><td>Полное наименование</td><td>Общество с ограниченной ответственностью Акме</td></tr>
          <tr><td>ИНН</td><td>77-01 234567</td></tr>
          <tr><td>КПП</td><td>770101001</td></tr>
          <tr><td>ОГРН</td><td>1027700000000</td></tr>
        </tbody></table></div>
    </body></html>"#;

    pub fn positions_html(rows: &[(&str, &str)], next: Option<&str>) -> String {
        let body: String = rows
            .iter()
            .map(|(n, name)| {
                format!("<tr><td>{n}</td><td>{name}</td><td>шт</td><td><div><b>27.32</b> Провода</div></td><td>10</td></tr>")
            })
            .collect();
        let next = next
            .map(|href| format!(r#"<a href="{href}">Следующая страница</a>"#))
            .unwrap_or_default();
        format!(
            r#"<html><body><div class="wideTable-wrap"><table>
            <tr class="thead"><td>№</td><td>Наименование</td><td>Ед. изм.</td><td>ОКПД2</td><td>Количество</td></tr>
            {body}</table></div>{next}</body></html>"#
        )
    }

    fn page(url: &str, html: &str) -> Page {
        Page { url: url.to_string(), html: html.to_string() }
    }

    fn item_record() -> AccumulatingRecord {
        match parse_item_page(&page(ITEM_URL, ITEM_HTML)) {
            ItemPage::Record(record) => *record,
            ItemPage::AlreadyPublished => panic!("unexpected skip"),
        }
    }

    #[test]
    fn test_item_scalars() {
        let record = item_record();
        assert_eq!(record.id, Some(2761308));
        assert_eq!(record.purchase_code_name.as_deref(), Some("Запрос предложений"));
        assert_eq!(record.title.as_deref(), Some("Поставка кабеля"));
        assert_eq!(record.lot_price, PriceValue::Parsed(1234567.89));
        assert_eq!(record.currency.as_deref(), Some("Российский рубль"));
        assert_eq!(record.delivery_place.as_deref(), Some("г. Москва, ул. Ленина, 1"));
        assert_eq!(record.url, ITEM_URL);
        assert_eq!(
            record.purchasing_positions_url.as_deref(),
            Some("https://www.example.com/market/postavka-kabelya-2761308/positions")
        );
        assert!(record.purchasing_positions.is_none());
    }

    #[test]
    fn test_item_classifications() {
        let record = item_record();
        assert_eq!(
            record.okpd2,
            Some(Classification { code: "27.32".into(), label: "Провода и кабели электронные".into() })
        );
        assert_eq!(
            record.okved2,
            Some(Classification { code: "46.69".into(), label: "Торговля оптовая".into() })
        );
    }

    #[test]
    fn test_item_dates_fall_back_to_publication() {
        let dates = item_record().dates;
        assert_eq!(dates.publication.as_deref(), Some("15.08.2021 10:00"));
        assert_eq!(dates.submission_open.as_deref(), Some("15.08.2021 10:00"));
        assert_eq!(dates.submission_close.as_deref(), Some("25.08.2021 18:00"));
        assert_eq!(dates.last_update.as_deref(), Some("16.08.2021 09:15"));
        assert_eq!(dates.submission_unsealing, None);
        assert_eq!(dates.submission_qualified, None);
    }

    #[test]
    fn test_item_organizer() {
        let placer = item_record().placer;
        assert_eq!(placer.url.as_deref(), Some("https://www.example.com/firms/acme-55/"));
        assert_eq!(placer.post_address.as_deref(), Some("101000, Москва"));
        assert_eq!(placer.fact_address, None);
        let contacts = placer.contacts.unwrap();
        assert_eq!(contacts.responsible_person.as_deref(), Some("Иванов И.И."));
        assert_eq!(contacts.email.as_deref(), Some("a@b.ru"));
        assert_eq!(contacts.phone_number.as_deref(), Some("+7 495 000-00-00"));
        assert_eq!(placer.inn, None);
    }

    #[test]
    fn test_item_additional_info() {
        let info = item_record().additional_info.unwrap();
        assert_eq!(info.get("Условия оплаты").map(String::as_str), Some("30 дней"));
        assert_eq!(info.get("Срок поставки").map(String::as_str), Some("до 01.10.2021"));
        assert_eq!(
            info.get("Примечание").map(String::as_str),
            Some("поставка частями по графику")
        );
        assert!(!info.contains_key("Пусто"));
        assert_eq!(info.len(), 3);
    }

    #[test]
    fn test_additional_info_from_bare_rows() {
        let html = r#"<html><body><h1>Закупка № 7</h1><div id="auction_info_td"><table>
            <tr><td>Дополнительная информация</td></tr>
            <tr><td><table>
                <tr><td><span>Гарантия</span></td><td>12 месяцев</td></tr>
                <tr><td><span>Оплата</span></td><td>по факту</td></tr>
            </table></td></tr>
        </table></div></body></html>"#;
        let ItemPage::Record(record) = parse_item_page(&page(ITEM_URL, html)) else {
            panic!("unexpected skip");
        };
        let info = record.additional_info.unwrap();
        assert_eq!(info.get("Гарантия").map(String::as_str), Some("12 месяцев"));
        assert_eq!(info.get("Оплата").map(String::as_str), Some("по факту"));
        assert_eq!(info.len(), 2);
    }

    #[test]
    fn test_item_already_published() {
        let html = r#"<html><body><div class="common_block">ЕИС</div><h1>Закупка</h1></body></html>"#;
        assert!(matches!(parse_item_page(&page(ITEM_URL, html)), ItemPage::AlreadyPublished));
    }

    #[test]
    fn test_item_missing_sections() {
        let ItemPage::Record(record) = parse_item_page(&page(ITEM_URL, "<html><body></body></html>")) else {
            panic!("unexpected skip");
        };
        assert_eq!(record.title, None);
        assert_eq!(record.okpd2, None);
        assert_eq!(record.lot_price, PriceValue::Absent);
        assert_eq!(record.placer.url, None);
        assert_eq!(record.placer.contacts, None);
        assert_eq!(record.purchasing_positions_url, None);
        assert_eq!(record.additional_info, None);
    }

    #[test]
    fn test_price_not_specified_label() {
        let html = r#"<table><tr id="trade-info-lot-price"><td>Цена:</td><td>Без указания цены</td></tr></table>"#;
        let ItemPage::Record(record) = parse_item_page(&page(ITEM_URL, html)) else {
            panic!("unexpected skip");
        };
        assert_eq!(record.lot_price, PriceValue::Absent);
    }

    #[test]
    fn test_code_label_incomplete() {
        let html = r#"<table><tr id="trade-info-okpd2"><td>ОКПД2:</td><td><div><b>27.32</b></div></td></tr></table>"#;
        let ItemPage::Record(record) = parse_item_page(&page(ITEM_URL, html)) else {
            panic!("unexpected skip");
        };
        assert_eq!(record.okpd2, None);
    }

    #[test]
    fn test_placer_page() {
        let profile = parse_placer_page(&page("https://www.example.com/firms/acme-55/", PLACER_HTML));
        assert_eq!(profile.short_name.as_deref(), Some("ООО Акме"));
        assert_eq!(
            profile.full_name.as_deref(),
            Some("Общество с ограниченной ответственностью Акме")
        );
        assert_eq!(profile.inn.as_deref(), Some("7701234567"));
        assert_eq!(profile.kpp.as_deref(), Some("770101001"));
        assert_eq!(profile.ogrn.as_deref(), Some("1027700000000"));
        assert_eq!(profile.okpo, None);
    }

    #[test]
    fn test_placer_page_without_profile() {
        let profile = parse_placer_page(&page("https://www.example.com/firms/x-1/", "<p>404</p>"));
        assert_eq!(profile, PlacerProfile::default());
    }

    #[test]
    fn test_positions_page() {
        let html = positions_html(&[("1", "Кабель ВВГ"), ("2", "Провод ПВС")], Some("?page=2"));
        let parsed = parse_positions_page(&page("https://www.example.com/market/k-1/positions", &html), 1);

        assert_eq!(
            parsed.next_page.as_deref(),
            Some("https://www.example.com/market/k-1/positions?page=2")
        );
        assert_eq!(parsed.positions.len(), 2);

        let first = &parsed.positions[&1];
        assert_eq!(first.ordinal_number.as_deref(), Some("1"));
        assert_eq!(first.name.as_deref(), Some("Кабель ВВГ"));
        assert_eq!(first.qty.as_deref(), Some("10"));
        assert_eq!(
            first.okpd2,
            Some(Classification { code: "27.32".into(), label: "Провода".into() })
        );
        assert_eq!(first.okved2, None);
        assert_eq!(first.additional_info.get("Ед. изм.").map(String::as_str), Some("шт"));
        assert_eq!(parsed.positions[&2].name.as_deref(), Some("Провод ПВС"));
    }

    #[test]
    fn test_positions_page_offsets_ordinals() {
        let html = positions_html(&[("11", "Болт")], None);
        let parsed = parse_positions_page(&page("https://www.example.com/market/k-1/positions", &html), 11);
        assert_eq!(parsed.positions.keys().copied().collect::<Vec<_>>(), vec![11]);
        assert_eq!(parsed.next_page, None);
    }

    #[test]
    fn test_positions_page_without_table() {
        let parsed = parse_positions_page(&page("https://www.example.com/market/k-1/positions", "<p></p>"), 1);
        assert!(parsed.schema.is_none());
        assert!(parsed.positions.is_empty());
    }

    #[test]
    fn test_listing_page() {
        let html = r#"<html><body>
            <a class="search-results-title" href="/market/postavka-1-101/">Поставка</a>
            <a class="search-results-title big" href="https://www.example.com/market/remont-102/">Ремонт</a>
            <a class="search-results-title" href="/market/zakrytyi-103/">Закрытый запрос</a>
            <a href="/market/?page=2">Следующая страница</a>
        </body></html>"#;
        let listing = parse_listing_page(&page("https://www.example.com/market/?searching=1", html));
        assert_eq!(
            listing.item_urls,
            vec![
                "https://www.example.com/market/postavka-1-101/",
                "https://www.example.com/market/remont-102/",
            ]
        );
        assert_eq!(listing.next_page.as_deref(), Some("https://www.example.com/market/?page=2"));
    }
}
