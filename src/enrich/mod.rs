//! Per-product price enrichment.
//!
//! Every catalog row is fetched, its embedded price structures recovered
//! and resolved into a minimum price per region. Rows that resolve are
//! gathered into a [`PriceTable`] whose region columns are only known once
//! every product has been seen.

use std::{
    collections::BTreeSet,
    num::NonZeroUsize,
    path::Path,
    sync::Arc,
    time::Duration,
};

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    extract::{BraceScanner, extract_object, extract_product_id},
    http::PageSource,
    note_product, pool,
    pricing::{self, OfferTable, Offers, RegionNames, region_column},
    progress::{BatchPhase, EntryStatus, ProgressReporter},
    store::{self, StoreError},
    warning::collect_notes,
};

pub const FIXED_COLUMNS: [&str; 6] = [
    "ID_Producto",
    "Nombre_Producto",
    "Numero_Proveedores",
    "Link_Producto",
    "Precio_Minimo_Global",
    "Region_Mejor_Precio",
];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("catalog input unavailable: {0}")]
    Input(StoreError),
    #[error("failed to write price table: {0}")]
    Output(StoreError),
}

/// Provider count as written in the catalog. Anything that is not a
/// non-negative number counts as zero; fractions are truncated.
pub fn parse_count(text: &str) -> u32 {
    match text.trim().parse::<f64>() {
        Ok(count) if count.is_finite() && count >= 0.0 => count.trunc() as u32,
        _ => 0,
    }
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let text = String::deserialize(deserializer)?;
    Ok(parse_count(&text))
}

/// A catalog row as read back for enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogRow {
    #[serde(rename = "ID_Producto")]
    pub product_id: String,
    #[serde(rename = "Nombre_Producto", default)]
    pub name: String,
    #[serde(
        rename = "Numero_Proveedores",
        default,
        deserialize_with = "lenient_count"
    )]
    pub provider_count: u32,
    #[serde(rename = "Link_Producto", default)]
    pub listing_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPriceRow {
    pub product_id: String,
    pub name: String,
    pub provider_count: u32,
    pub listing_url: String,
    pub global_minimum: i64,
    pub best_region: String,
    /// Region price keyed by output column name.
    pub region_prices: IndexMap<String, i64>,
}

/// Resolve the prices embedded in one product page.
///
/// `None` when the page carries no base price table or no region ends up
/// with a positive price.
pub fn enrich_page(row: &CatalogRow, html: &str, max_scan: usize) -> Option<ResolvedPriceRow> {
    let scanner = BraceScanner::new(max_scan);
    let names = ["region_names", "regionMapping"]
        .into_iter()
        .filter_map(|key| extract_object(html, key, scanner))
        .find(|names| !names.is_empty())
        .map(|names| RegionNames::from_object(&names))
        .unwrap_or_default();
    if names.is_empty() {
        note_product!("no region names, falling back to region ids");
    }
    let page_product_id = extract_product_id(html);

    let Some(base) = extract_object(html, "jsonResult", scanner) else {
        note_product!("no base price table");
        return None;
    };
    let offer_table =
        extract_object(html, "offerPrices", scanner).map(|offers| OfferTable::from_object(&offers));
    let offers = match (&offer_table, page_product_id.as_deref()) {
        (Some(table), Some(product_id)) => Some(Offers { table, product_id }),
        (Some(table), None) if !table.is_empty() => {
            note_product!("special offers ignored, page has no product id");
            None
        }
        _ => None,
    };

    let prices = pricing::resolve(&base, offers, &names);
    let Some((best_region, global_minimum)) = prices.best() else {
        note_product!("no region with a positive price");
        return None;
    };
    let mut region_prices = IndexMap::with_capacity(prices.len());
    for (region, price) in prices.iter() {
        region_prices
            .entry(region_column(region))
            .and_modify(|current: &mut i64| *current = (*current).min(price))
            .or_insert(price);
    }
    Some(ResolvedPriceRow {
        product_id: row.product_id.clone(),
        name: row.name.clone(),
        provider_count: row.provider_count,
        listing_url: row.listing_url.clone(),
        global_minimum,
        best_region: best_region.to_owned(),
        region_prices,
    })
}

/// Resolved rows plus the union of their region columns.
#[derive(Debug, Default)]
pub struct PriceTable {
    rows: Vec<ResolvedPriceRow>,
    region_columns: BTreeSet<String>,
}

impl PriceTable {
    pub fn push(&mut self, row: ResolvedPriceRow) {
        self.region_columns
            .extend(row.region_prices.keys().cloned());
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Fixed columns, then region columns in lexicographic order.
    pub fn headers(&self) -> Vec<String> {
        FIXED_COLUMNS
            .iter()
            .map(|column| column.to_string())
            .chain(self.region_columns.iter().cloned())
            .collect()
    }

    pub fn records(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        self.rows.iter().map(|row| {
            let mut record = vec![
                row.product_id.clone(),
                row.name.clone(),
                row.provider_count.to_string(),
                row.listing_url.clone(),
                row.global_minimum.to_string(),
                row.best_region.clone(),
            ];
            record.extend(self.region_columns.iter().map(|column| {
                row.region_prices
                    .get(column)
                    .map(i64::to_string)
                    .unwrap_or_default()
            }));
            record
        })
    }

    pub fn write(&self, path: &Path) -> Result<(), StoreError> {
        store::write_table(path, self.headers(), self.records())
    }
}

impl Extend<ResolvedPriceRow> for PriceTable {
    fn extend<T: IntoIterator<Item = ResolvedPriceRow>>(&mut self, iter: T) {
        for row in iter {
            self.push(row);
        }
    }
}

impl FromIterator<ResolvedPriceRow> for PriceTable {
    fn from_iter<T: IntoIterator<Item = ResolvedPriceRow>>(iter: T) -> Self {
        let mut table = Self::default();
        table.extend(iter);
        table
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PricesSummary {
    pub products: usize,
    pub resolved: usize,
    pub unpriced: usize,
    pub failed: usize,
    pub region_columns: usize,
    pub written: bool,
}

enum ProductOutcome {
    Resolved(ResolvedPriceRow),
    Unpriced,
    Failed,
}

async fn price_product<S: PageSource>(
    source: &S,
    reporter: &dyn ProgressReporter,
    row: CatalogRow,
    max_scan: usize,
) -> ProductOutcome {
    let product_id = row.product_id.as_str();
    reporter.update_entry(product_id, EntryStatus::Fetching);
    let html = match source.fetch(&row.listing_url).await {
        Ok(html) => html,
        Err(error) => {
            warn!(product_id, %error, "product skipped");
            reporter.update_entry(product_id, EntryStatus::Failed(error.to_string()));
            return ProductOutcome::Failed;
        }
    };

    reporter.update_entry(product_id, EntryStatus::Resolving);
    let (resolved, notes) = collect_notes(async { enrich_page(&row, &html, max_scan) }).await;
    for note in notes.iter() {
        debug!(product_id, note, "degraded price data");
    }
    match resolved {
        Some(resolved) => {
            info!(
                product_id,
                minimum = resolved.global_minimum,
                region = %resolved.best_region,
                "prices resolved"
            );
            reporter.update_entry(product_id, EntryStatus::Done);
            ProductOutcome::Resolved(resolved)
        }
        None => {
            let reason = if notes.is_empty() {
                "no price data".to_owned()
            } else {
                notes.summary()
            };
            reporter.update_entry(product_id, EntryStatus::Skipped(reason));
            ProductOutcome::Unpriced
        }
    }
}

/// Enrich the catalog at `config.prices.input` and write the price table.
pub async fn enrich<S: PageSource>(
    config: &Config,
    source: Arc<S>,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<PricesSummary, Error> {
    reporter.set_phase(BatchPhase::LoadingCatalog);
    let mut rows = store::read_rows::<CatalogRow>(&config.prices.input).map_err(Error::Input)?;
    if let Some(max) = config.prices.max_products {
        rows.truncate(max);
    }
    reporter.log_info(&format!(
        "{} products loaded from {}",
        rows.len(),
        config.prices.input.display()
    ));

    reporter.set_phase(BatchPhase::ExtractingPrices);
    reporter.register_entries(rows.iter().map(|row| row.product_id.clone()).collect());
    let products = rows.len();
    let workers = NonZeroUsize::new(config.prices.workers).unwrap_or(NonZeroUsize::MIN);
    let max_scan = config.prices.max_scan;
    let outcomes = pool::run(
        rows,
        workers,
        Duration::from_millis(config.prices.delay_ms),
        {
            let reporter = reporter.clone();
            move |row| {
                let source = source.clone();
                let reporter = reporter.clone();
                async move { price_product(&*source, &*reporter, row, max_scan).await }
            }
        },
    )
    .await;

    let mut summary = PricesSummary {
        products,
        ..PricesSummary::default()
    };
    let mut table = PriceTable::default();
    for outcome in outcomes {
        match outcome {
            ProductOutcome::Resolved(row) => table.push(row),
            ProductOutcome::Unpriced => summary.unpriced += 1,
            ProductOutcome::Failed => summary.failed += 1,
        }
    }
    summary.resolved = table.len();
    summary.region_columns = table.region_columns.len();

    if table.is_empty() {
        warn!("no product resolved a price, nothing written");
        reporter.log_warn("no product resolved a price, nothing written");
        return Ok(summary);
    }
    reporter.set_phase(BatchPhase::WritingTable);
    let output = &config.prices.output;
    table.write(output).map_err(Error::Output)?;
    reporter.log_info(&format!(
        "{} rows with {} region columns written to {}",
        table.len(),
        summary.region_columns,
        output.display()
    ));
    reporter.set_saved(table.len());
    summary.written = true;
    Ok(summary)
}

#[cfg(test)]
mod test {
    use super::*;

    const PRODUCT_PAGE: &str = r#"
<html><head><script type="text/x-magento-init">
{"*": {"priceBox": {
  "productId": "987654",
  "jsonResult": {"10": {"p1": {"price": "1,000"}, "p2": {"price": "$900"}}, "20": {"p1": {"price": "500"}}},
  "offerPrices": {"p1": {"987654": {"20": {"special_price": "100"}}}},
  "region_names": {"10": "Región de Ñuble", "20": "Región del Bío-Bío"}
}}}
</script></head><body></body></html>
"#;

    fn row() -> CatalogRow {
        CatalogRow {
            product_id: "1234567".into(),
            name: "Arroz grado 1".into(),
            provider_count: 2,
            listing_url: "https://market.test/arroz.html".into(),
        }
    }

    #[test]
    fn counts_are_lenient() {
        assert_eq!(parse_count("78"), 78);
        assert_eq!(parse_count(" 12.0 "), 12);
        assert_eq!(parse_count("12.9"), 12);
        assert_eq!(parse_count(""), 0);
        assert_eq!(parse_count("sin datos"), 0);
        assert_eq!(parse_count("-3"), 0);
    }

    #[test]
    fn page_with_offers_and_names() {
        let resolved = enrich_page(&row(), PRODUCT_PAGE, 500_000).unwrap();
        assert_eq!(resolved.global_minimum, 100);
        assert_eq!(resolved.best_region, "Región del Bío-Bío");
        assert_eq!(
            resolved.region_prices,
            IndexMap::from([
                ("Precio_Nuble".to_owned(), 900),
                ("Precio_Bio_Bio".to_owned(), 100),
            ])
        );
        assert_eq!(resolved.product_id, "1234567");
    }

    #[test]
    fn region_mapping_is_the_fallback_name_source() {
        let page = r#"{"regionMapping": {"10": "North"}, "jsonResult": {"10": {"p1": {"price": 300}}}}"#;
        let resolved = enrich_page(&row(), page, 500_000).unwrap();
        assert_eq!(resolved.best_region, "North");
        assert_eq!(resolved.region_prices.get("Precio_North"), Some(&300));
    }

    #[test]
    fn empty_region_names_fall_through_to_region_mapping() {
        let page = r#"{"region_names": {}, "regionMapping": {"10": "North"}, "jsonResult": {"10": {"p1": {"price": 300}}}}"#;
        let resolved = enrich_page(&row(), page, 500_000).unwrap();
        assert_eq!(resolved.best_region, "North");
        assert_eq!(
            resolved.region_prices,
            IndexMap::from([("Precio_North".to_owned(), 300)])
        );

        let page = r#"{"region_names": {}, "regionMapping": {}, "jsonResult": {"10": {"p1": {"price": 300}}}}"#;
        let resolved = enrich_page(&row(), page, 500_000).unwrap();
        assert_eq!(resolved.best_region, "Region_ID_10");
    }

    #[test]
    fn regions_folding_to_one_column_keep_the_lower_price() {
        let page = r#"{"region_names": {"1": "Región de Ñuble", "2": "Nuble"},
            "jsonResult": {"1": {"p1": {"price": 700}}, "2": {"p1": {"price": 400}}}}"#;
        let resolved = enrich_page(&row(), page, 500_000).unwrap();
        assert_eq!(
            resolved.region_prices,
            IndexMap::from([("Precio_Nuble".to_owned(), 400)])
        );
    }

    #[tokio::test]
    async fn offers_need_a_page_product_id() {
        let page = r#"{"jsonResult": {"10": {"p1": {"price": "800"}}},
            "offerPrices": {"p1": {"1": {"10": {"special_price": "5"}}}}}"#;
        let (resolved, notes) = collect_notes(async { enrich_page(&row(), page, 500_000) }).await;
        let resolved = resolved.unwrap();
        assert_eq!(resolved.global_minimum, 800);
        assert_eq!(resolved.best_region, "Region_ID_10");
        assert_eq!(
            notes.iter().collect::<Vec<_>>(),
            [
                "no region names, falling back to region ids",
                "special offers ignored, page has no product id",
            ]
        );
    }

    #[tokio::test]
    async fn pages_without_prices_yield_no_row() {
        let (resolved, notes) =
            collect_notes(async { enrich_page(&row(), "<html>sold out</html>", 500_000) }).await;
        assert!(resolved.is_none());
        assert!(notes.iter().any(|note| note == "no base price table"));

        let zeros = r#"{"region_names": {"10": "North"}, "jsonResult": {"10": {"p1": {"price": "0"}, "p2": {"price": "n/a"}}}}"#;
        assert!(enrich_page(&row(), zeros, 500_000).is_none());
    }

    #[test]
    fn table_columns_are_the_sorted_union() {
        let first = enrich_page(&row(), PRODUCT_PAGE, 500_000).unwrap();
        let second = ResolvedPriceRow {
            product_id: "2".into(),
            name: "Avena".into(),
            provider_count: 0,
            listing_url: "https://market.test/avena.html".into(),
            global_minimum: 40,
            best_region: "Arica".into(),
            region_prices: IndexMap::from([("Precio_Arica".to_owned(), 40)]),
        };
        let table = [first, second].into_iter().collect::<PriceTable>();
        assert_eq!(
            table.headers(),
            [
                "ID_Producto",
                "Nombre_Producto",
                "Numero_Proveedores",
                "Link_Producto",
                "Precio_Minimo_Global",
                "Region_Mejor_Precio",
                "Precio_Arica",
                "Precio_Bio_Bio",
                "Precio_Nuble",
            ]
        );
        let records = table.records().collect::<Vec<_>>();
        assert_eq!(
            records[0][4..],
            ["100", "Región del Bío-Bío", "", "100", "900"]
        );
        assert_eq!(records[1][6..], ["40", "", ""]);
    }
}
