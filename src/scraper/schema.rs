//! Column layout inference for the purchasing-positions table.
//!
//! Column order and presence differ between auctions, so the mapping from
//! column to field is rebuilt from the header text on every positions page.

use crate::scraper::dom::{children_named, find_containing, following_siblings, nth_child_named, own_text, select_first};
use scraper::ElementRef;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Fields the positions table is searched for, in search order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KnownField {
    OrdinalNumber,
    Name,
    Quantity,
    Okved2,
    Okpd2,
}

impl KnownField {
    pub const ALL: [KnownField; 5] = [
        KnownField::OrdinalNumber,
        KnownField::Name,
        KnownField::Quantity,
        KnownField::Okved2,
        KnownField::Okpd2,
    ];

    /// Header keyword identifying the column.
    pub fn keyword(self) -> &'static str {
        match self {
            KnownField::OrdinalNumber => "№",
            KnownField::Name => "Наименование",
            KnownField::Quantity => "Количество",
            KnownField::Okved2 => "ОКВЭД",
            KnownField::Okpd2 => "ОКПД",
        }
    }

    /// Classification cells hold a bold code followed by its label.
    pub fn is_classification(self) -> bool {
        matches!(self, KnownField::Okved2 | KnownField::Okpd2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Column {
    Known(KnownField),
    /// Not one of the known fields; carries the column's header label.
    Residual(String),
}

/// Column → field mapping for one positions page. Column indices are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<Column>,
}

impl TableSchema {
    /// Build a schema for `column_count` columns.
    ///
    /// `locate` returns the column a field's keyword was found in, if any;
    /// `header_label` returns the header text of a column.
    pub fn from_header(
        column_count: usize,
        locate: impl Fn(KnownField) -> Option<usize>,
        header_label: impl Fn(usize) -> String,
    ) -> Self {
        let mut claimed: BTreeMap<usize, KnownField> = BTreeMap::new();

        for field in KnownField::ALL {
            let index = match (locate(field), field) {
                (Some(i), _) => i,
                // First column carries the ordinal when no header says so.
                (None, KnownField::OrdinalNumber) => 1,
                (None, _) => {
                    debug!("positions table: no {:?} column", field);
                    continue;
                }
            };

            if !(1..=column_count).contains(&index) {
                warn!("positions table: {:?} resolved to column {} outside 1..={}", field, index, column_count);
                continue;
            }
            if let Some(owner) = claimed.get(&index) {
                warn!("positions table: column {} already taken by {:?}, dropping {:?}", index, owner, field);
                continue;
            }
            claimed.insert(index, field);
        }

        let columns = (1..=column_count)
            .map(|index| match claimed.get(&index) {
                Some(field) => Column::Known(*field),
                None => Column::Residual(header_label(index)),
            })
            .collect();

        Self { columns }
    }

    /// Infer the schema from a rendered positions table (`div.wideTable-wrap`).
    ///
    /// Returns `None` when the table has no cells.
    pub fn infer(table: ElementRef<'_>) -> Option<Self> {
        let first_row = select_first(table, "tr")?;
        let column_count = children_named(first_row, "td").count();
        if column_count == 0 {
            return None;
        }

        let header_row = select_first(table, "tr.thead");

        let locate = |field: KnownField| {
            let cell = find_containing(table, "td", field.keyword())?;
            let after = following_siblings(cell)
                .filter(|s| s.value().name() == "td")
                .count();
            column_count.checked_sub(after)
        };

        let header_label = |index: usize| {
            header_row
                .and_then(|row| nth_child_named(row, "td", index))
                .map(own_text)
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| format!("column {index}"))
        };

        Some(Self::from_header(column_count, locate, header_label))
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index.checked_sub(1)?)
    }

    #[cfg(test)]
    pub fn field_column(&self, field: KnownField) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| *c == Column::Known(field))
            .map(|i| i + 1)
    }

    pub fn residual_columns(&self) -> impl Iterator<Item = (usize, &str)> {
        self.columns.iter().enumerate().filter_map(|(i, c)| match c {
            Column::Residual(label) => Some((i + 1, label.as_str())),
            Column::Known(_) => None,
        })
    }
}
