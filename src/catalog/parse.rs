//! Listing page scraping.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::CatalogEntry;

static TOOLBAR_NUMBER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.toolbar-number").unwrap());
static PRODUCT_ITEM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li.item.product.product-item").unwrap());
static PRODUCT_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.product-item-link").unwrap());
static SELLERS_COUNT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.sellers-count").unwrap());
static PRODUCT_ID_TOP: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.product-id-top").unwrap());

static DIGITS: LazyLock<regex::Regex> = LazyLock::new(|| regex::Regex::new(r"(\d+)").unwrap());
static LISTING_ID: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"ID\s+(\d+)").unwrap());

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_owned()
}

fn first_capture(pattern: &regex::Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
}

/// Total product count announced in the listing toolbar.
///
/// The toolbar repeats `span.toolbar-number`; the second one holds the total.
pub fn parse_total(html: &str) -> Option<u32> {
    let doc = Html::parse_document(html);
    let total = doc.select(&TOOLBAR_NUMBER).nth(1)?;
    text_of(total).parse().ok()
}

fn parse_item(item: ElementRef<'_>, page: u32) -> CatalogEntry {
    let link = item.select(&PRODUCT_LINK).next();
    let name = link.map(text_of).unwrap_or_default();
    let listing_url = link
        .and_then(|link| link.attr("href"))
        .unwrap_or_default()
        .to_owned();
    let provider_count = item
        .select(&SELLERS_COUNT)
        .next()
        .and_then(|sellers| first_capture(&DIGITS, &text_of(sellers)))
        .and_then(|count| count.parse().ok());
    let product_id = item
        .select(&PRODUCT_ID_TOP)
        .next()
        .and_then(|id| first_capture(&LISTING_ID, &text_of(id)))
        .unwrap_or_default();
    CatalogEntry {
        product_id,
        name,
        provider_count,
        listing_url,
        source_page: page,
    }
}

/// Every product item on a listing page, in page order.
pub fn parse_list_page(html: &str, page: u32) -> Vec<CatalogEntry> {
    let doc = Html::parse_document(html);
    doc.select(&PRODUCT_ITEM)
        .map(|item| parse_item(item, page))
        .collect()
}
