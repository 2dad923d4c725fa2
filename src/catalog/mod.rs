//! Catalog listing harvest.
//!
//! Walks the paginated marketplace listing, scrapes one [`CatalogEntry`] per
//! product item and appends the entries not seen before to the catalog
//! table.

use std::{
    collections::HashSet,
    num::NonZeroUsize,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

mod parse;

pub use parse::{parse_list_page, parse_total};

use crate::{
    config::{Config, Marketplace},
    http::{FetchError, PageSource},
    pool,
    progress::{BatchPhase, EntryStatus, ProgressReporter},
    store::{self, StoreError},
};

/// One product as listed in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "ID_Producto")]
    pub product_id: String,
    #[serde(rename = "Nombre_Producto")]
    pub name: String,
    #[serde(rename = "Numero_Proveedores")]
    pub provider_count: Option<u32>,
    #[serde(rename = "Link_Producto")]
    pub listing_url: String,
    #[serde(rename = "Pagina")]
    pub source_page: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid listing URL: {0}")]
    Url(url::ParseError),
    #[error("failed to fetch first listing page: {0}")]
    Discover(FetchError),
    #[error("total product count not found ({url})")]
    TotalNotFound { url: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub fn listing_url(marketplace: &Marketplace, page: u32) -> Result<String, url::ParseError> {
    let mut url = url::Url::parse(&marketplace.base_url)?;
    url.query_pairs_mut()
        .append_pair("p", &page.to_string())
        .append_pair("product_list_limit", &marketplace.page_size.to_string())
        .append_pair("product_list_mode", "list")
        .append_pair("product_list_order", &marketplace.order);
    Ok(url.into())
}

pub fn page_count(total: u32, page_size: u32) -> u32 {
    total.div_ceil(page_size.max(1))
}

/// Product ids recorded so far, shared by all page workers.
#[derive(Debug, Default)]
pub struct SeenIds(Mutex<HashSet<String>>);

impl SeenIds {
    pub fn new(known: HashSet<String>) -> Self {
        Self(Mutex::new(known))
    }

    /// Record `id`, returning whether it was new. Empty ids are never new.
    pub fn insert(&self, id: &str) -> bool {
        if id.is_empty() {
            return false;
        }
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_owned())
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogSummary {
    pub pages_available: u32,
    pub pages_processed: u32,
    pub pages_failed: u32,
    pub new_entries: usize,
    pub rows_in_table: usize,
    pub unique_ids: usize,
}

struct PageOutcome {
    fetched: bool,
    fresh: Vec<CatalogEntry>,
}

fn page_label(page: u32) -> String {
    format!("page {page}")
}

async fn scrape_page<S: PageSource>(
    source: &S,
    marketplace: &Marketplace,
    seen: &SeenIds,
    reporter: &dyn ProgressReporter,
    page: u32,
) -> PageOutcome {
    let label = page_label(page);
    reporter.update_entry(&label, EntryStatus::Fetching);
    let html = match listing_url(marketplace, page) {
        Ok(url) => source.fetch(&url).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    let html = match html {
        Ok(html) => html,
        Err(e) => {
            warn!(page, error = %e, "listing page skipped");
            reporter.update_entry(&label, EntryStatus::Failed(e));
            return PageOutcome {
                fetched: false,
                fresh: Vec::new(),
            };
        }
    };
    let entries = parse_list_page(&html, page);
    let scraped = entries.len();
    let fresh = entries
        .into_iter()
        .filter(|entry| seen.insert(&entry.product_id))
        .collect::<Vec<_>>();
    info!(page, scraped, fresh = fresh.len(), "listing page scraped");
    reporter.update_entry(&label, EntryStatus::Done);
    PageOutcome {
        fetched: true,
        fresh,
    }
}

/// Scrape the listing and append new entries to the catalog table.
pub async fn harvest<S: PageSource>(
    config: &Config,
    source: Arc<S>,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<CatalogSummary, Error> {
    reporter.set_phase(BatchPhase::DiscoveringCatalog);
    let first = listing_url(&config.marketplace, 1).map_err(Error::Url)?;
    let html = source.fetch(&first).await.map_err(Error::Discover)?;
    let total = parse_total(&html).ok_or(Error::TotalNotFound { url: first })?;
    let pages_available = page_count(total, config.marketplace.page_size);
    let pages = config
        .catalog
        .max_pages
        .map_or(pages_available, |max| max.min(pages_available));
    reporter.log_info(&format!(
        "{total} products over {pages_available} pages, scraping {pages}"
    ));

    let output = &config.catalog.output;
    let seen = Arc::new(SeenIds::new(store::read_known_ids(output)?));
    if !seen.is_empty() {
        reporter.log_info(&format!("{} ids already recorded", seen.len()));
    }

    reporter.set_phase(BatchPhase::ScrapingPages);
    reporter.register_entries((1..=pages).map(page_label).collect());
    let workers = NonZeroUsize::new(config.catalog.workers).unwrap_or(NonZeroUsize::MIN);
    let outcomes = pool::run(
        1..=pages,
        workers,
        Duration::from_millis(config.catalog.delay_ms),
        {
            let marketplace = config.marketplace.clone();
            let reporter = reporter.clone();
            move |page| {
                let source = source.clone();
                let marketplace = marketplace.clone();
                let seen = seen.clone();
                let reporter = reporter.clone();
                async move { scrape_page(&*source, &marketplace, &seen, &*reporter, page).await }
            }
        },
    )
    .await;

    let pages_failed = outcomes.iter().filter(|outcome| !outcome.fetched).count() as u32;
    let fresh = outcomes
        .into_iter()
        .flat_map(|outcome| outcome.fresh)
        .collect::<Vec<_>>();

    reporter.set_phase(BatchPhase::SavingCatalog);
    if fresh.is_empty() {
        reporter.log_info("no new products found");
    } else {
        store::append_rows(output, &fresh)?;
        reporter.log_info(&format!(
            "added {} new products to {}",
            fresh.len(),
            output.display()
        ));
    }
    reporter.set_saved(fresh.len());

    let stats = store::table_stats(output)?;
    Ok(CatalogSummary {
        pages_available,
        pages_processed: pages,
        pages_failed,
        new_entries: fresh.len(),
        rows_in_table: stats.rows,
        unique_ids: stats.unique_ids,
    })
}
