use std::{collections::HashMap, path::Path, sync::Arc};

use crate::{
    catalog::{self, CatalogEntry},
    config::Config,
    enrich,
    http::{FetchError, PageSource},
    progress::NullReporter,
    store,
};

const BASE_URL: &str = "https://market.test/alimentos";

/// Pages served from memory, keyed by URL. Unknown URLs answer 404.
#[derive(Default)]
struct FixtureSource {
    pages: HashMap<String, String>,
}

impl FixtureSource {
    fn with(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
        self.pages.insert(url.into(), html.into());
        self
    }
}

impl PageSource for FixtureSource {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_owned(),
                status: 404,
            })
    }
}

fn config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.marketplace.base_url = BASE_URL.into();
    config.marketplace.page_size = 2;
    config.catalog.workers = 2;
    config.catalog.delay_ms = 0;
    config.catalog.output = dir.join("catalog.csv");
    config.prices.workers = 2;
    config.prices.delay_ms = 0;
    config.prices.input = dir.join("catalog.csv");
    config.prices.output = dir.join("prices.csv");
    config
}

fn page_url(page: u32) -> String {
    format!(
        "{BASE_URL}?p={page}&product_list_limit=2&product_list_mode=list&product_list_order=name"
    )
}

fn list_page(total: u32, items: &[(&str, &str, u32)]) -> String {
    let items = items
        .iter()
        .map(|(id, name, sellers)| {
            format!(
                r#"<li class="item product product-item">
  <div class="product-id-top">ID {id}</div>
  <a class="product-item-link" href="https://market.test/{id}.html">{name}</a>
  <div class="sellers-count">{sellers} proveedores</div>
</li>"#
            )
        })
        .collect::<String>();
    format!(
        r#"<html><body>
<div class="toolbar-products"><span class="toolbar-number">1</span><span class="toolbar-number">{total}</span></div>
<ol class="product-items">{items}</ol>
</body></html>"#
    )
}

fn product_page(product_id: &str, prices: &str, names: &str) -> String {
    format!(
        r#"<html><script>
window.priceConfig = {{"productId": "{product_id}", "jsonResult": {prices}, "region_names": {names}}};
</script></html>"#
    )
}

#[tokio::test]
async fn catalog_is_appended_without_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let source = Arc::new(
        FixtureSource::default()
            .with(page_url(1), list_page(5, &[("1", "Arroz", 3), ("2", "Avena", 1)]))
            .with(page_url(2), list_page(5, &[("2", "Avena", 1), ("3", "Lentejas", 4)])),
    );

    let summary = catalog::harvest(&config, source.clone(), Arc::new(NullReporter))
        .await
        .unwrap();
    assert_eq!(summary.pages_available, 3);
    assert_eq!(summary.pages_processed, 3);
    assert_eq!(summary.pages_failed, 1);
    assert_eq!(summary.new_entries, 3);
    assert_eq!(summary.rows_in_table, 3);
    assert_eq!(summary.unique_ids, 3);

    let raw = std::fs::read(&config.catalog.output).unwrap();
    assert!(raw.starts_with(store::BOM));
    let mut entries = store::read_rows::<CatalogEntry>(&config.catalog.output).unwrap();
    entries.sort_by(|a, b| a.product_id.cmp(&b.product_id));
    assert_eq!(
        entries.iter().map(|e| e.product_id.as_str()).collect::<Vec<_>>(),
        ["1", "2", "3"]
    );
    assert_eq!(entries[2].provider_count, Some(4));
    assert_eq!(entries[2].listing_url, "https://market.test/3.html");

    let again = catalog::harvest(&config, source, Arc::new(NullReporter))
        .await
        .unwrap();
    assert_eq!(again.new_entries, 0);
    assert_eq!(again.rows_in_table, 3);
}

#[tokio::test]
async fn catalog_honours_page_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.catalog.max_pages = Some(1);
    let source = Arc::new(
        FixtureSource::default()
            .with(page_url(1), list_page(40, &[("7", "Quinoa", 2)])),
    );
    let summary = catalog::harvest(&config, source, Arc::new(NullReporter))
        .await
        .unwrap();
    assert_eq!(summary.pages_available, 20);
    assert_eq!(summary.pages_processed, 1);
    assert_eq!(summary.pages_failed, 0);
    assert_eq!(summary.new_entries, 1);
}

#[tokio::test]
async fn catalog_without_total_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let source = Arc::new(FixtureSource::default().with(page_url(1), "<html></html>"));
    let result = catalog::harvest(&config, source, Arc::new(NullReporter)).await;
    assert!(matches!(result, Err(catalog::Error::TotalNotFound { .. })));
    assert!(!config.catalog.output.exists());
}

#[tokio::test]
async fn prices_are_written_with_region_columns() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    std::fs::write(
        &config.prices.input,
        "\u{feff}ID_Producto,Nombre_Producto,Numero_Proveedores,Link_Producto,Pagina\n\
         1,Arroz,3,https://market.test/1.html,1\n\
         2,Avena,,https://market.test/2.html,1\n\
         3,Lentejas,4.0,https://market.test/3.html,2\n\
         4,Sal,1,https://market.test/missing.html,2\n",
    )
    .unwrap();
    let source = Arc::new(
        FixtureSource::default()
            .with(
                "https://market.test/1.html",
                product_page(
                    "11",
                    r#"{"10": {"p1": {"price": "1000"}, "p2": {"price": "900"}}, "20": {"p1": {"price": "500"}}}"#,
                    r#"{"10": "North", "20": "South"}"#,
                ),
            )
            .with(
                "https://market.test/2.html",
                product_page(
                    "22",
                    r#"{"30": {"p9": {"price": "$1,200"}}}"#,
                    r#"{"30": "Región de Ñuble"}"#,
                ),
            )
            .with(
                "https://market.test/3.html",
                product_page("33", r#"{"10": {"p1": {"price": "0"}}}"#, r#"{"10": "North"}"#),
            ),
    );

    let summary = enrich::enrich(&config, source, Arc::new(NullReporter))
        .await
        .unwrap();
    assert_eq!(summary.products, 4);
    assert_eq!(summary.resolved, 2);
    assert_eq!(summary.unpriced, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.region_columns, 3);
    assert!(summary.written);

    let raw = std::fs::read(&config.prices.output).unwrap();
    assert!(raw.starts_with(store::BOM));
    let mut reader = csv::Reader::from_reader(&raw[store::BOM.len()..]);
    assert_eq!(
        reader.headers().unwrap(),
        vec![
            "ID_Producto",
            "Nombre_Producto",
            "Numero_Proveedores",
            "Link_Producto",
            "Precio_Minimo_Global",
            "Region_Mejor_Precio",
            "Precio_North",
            "Precio_Nuble",
            "Precio_South",
        ]
    );
    let mut records = reader
        .records()
        .map(|record| record.unwrap().iter().map(str::to_owned).collect::<Vec<_>>())
        .collect::<Vec<_>>();
    records.sort();
    assert_eq!(
        records,
        [
            ["1", "Arroz", "3", "https://market.test/1.html", "500", "South", "900", "", "500"],
            ["2", "Avena", "0", "https://market.test/2.html", "1200", "Región de Ñuble", "", "1200", ""],
        ]
    );
}

#[tokio::test]
async fn prices_limit_products_and_skip_empty_output() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.prices.max_products = Some(1);
    std::fs::write(
        &config.prices.input,
        "ID_Producto,Nombre_Producto,Numero_Proveedores,Link_Producto,Pagina\n\
         1,Arroz,3,https://market.test/1.html,1\n\
         2,Avena,2,https://market.test/2.html,1\n",
    )
    .unwrap();
    let source = Arc::new(
        FixtureSource::default().with("https://market.test/1.html", "<html>agotado</html>"),
    );
    let summary = enrich::enrich(&config, source, Arc::new(NullReporter))
        .await
        .unwrap();
    assert_eq!(summary.products, 1);
    assert_eq!(summary.unpriced, 1);
    assert!(!summary.written);
    assert!(!config.prices.output.exists());
}

#[tokio::test]
async fn prices_need_a_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let result = enrich::enrich(&config, Arc::new(FixtureSource::default()), Arc::new(NullReporter)).await;
    assert!(matches!(result, Err(enrich::Error::Input(_))));
}
