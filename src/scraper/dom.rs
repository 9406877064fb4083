//! Small traversal helpers over `scraper`'s DOM.
//!
//! The site's markup is addressed mostly by structure (sibling cells, direct
//! text nodes, "the cell whose text contains X"), which CSS selectors alone
//! can't express. These helpers cover that gap.

use crate::scraper::cleaner::normalize_space;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

fn parse_selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(sel) => Some(sel),
        Err(e) => {
            warn!("invalid selector {:?}: {:?}", css, e);
            None
        }
    }
}

pub fn select_first<'a>(scope: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let sel = parse_selector(css)?;
    scope.select(&sel).next()
}

pub fn select_all<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    let Some(sel) = parse_selector(css) else {
        return Vec::new();
    };
    scope.select(&sel).collect()
}

/// First element anywhere in the document matching `css`.
pub fn doc_first<'a>(doc: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    select_first(doc.root_element(), css)
}

pub fn child_elements<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    el.children().filter_map(ElementRef::wrap)
}

pub fn children_named<'a>(el: ElementRef<'a>, name: &'a str) -> impl Iterator<Item = ElementRef<'a>> {
    child_elements(el).filter(move |c| c.value().name() == name)
}

/// 1-based `name[n]` child, as in XPath `./td[2]`.
pub fn nth_child_named<'a>(el: ElementRef<'a>, name: &'a str, n: usize) -> Option<ElementRef<'a>> {
    children_named(el, name).nth(n.checked_sub(1)?)
}

pub fn following_siblings<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    el.next_siblings().filter_map(ElementRef::wrap)
}

/// Direct text nodes of `el`, each normalized, blanks dropped.
pub fn own_text_nodes(el: ElementRef<'_>) -> Vec<String> {
    el.children()
        .filter_map(|node| node.value().as_text().map(|t| normalize_space(t)))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Normalized direct text of `el`, ignoring text inside child elements.
pub fn own_text(el: ElementRef<'_>) -> String {
    own_text_nodes(el).join(" ")
}

/// Normalized text of `el` and all descendants.
pub fn full_text(el: ElementRef<'_>) -> String {
    normalize_space(&el.text().collect::<String>())
}

/// First `tag` below `scope` whose own text contains `needle`.
pub fn find_containing<'a>(scope: ElementRef<'a>, tag: &str, needle: &str) -> Option<ElementRef<'a>> {
    select_all(scope, tag)
        .into_iter()
        .find(|el| own_text(*el).contains(needle))
}

pub fn attr(el: ElementRef<'_>, name: &str) -> Option<String> {
    el.value().attr(name).map(str::to_string)
}
