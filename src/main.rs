use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::Context;
use catalog_harvest::{
    catalog,
    config::Config,
    enrich,
    http::HttpSource,
    progress::{BatchPhase, ProgressReporter, create_reporter},
};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

#[derive(Parser)]
#[command(version, about = "Harvest a marketplace catalog and its regional prices")]
struct Opts {
    #[clap(short, long, env = "CATALOG_HARVEST_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape listing pages into the catalog table
    Catalog(CatalogArgs),
    /// Resolve regional prices for every catalog row
    Prices(PricesArgs),
    /// Scrape the catalog, then resolve prices for it
    Run {
        /// Stop after this many listing pages
        #[arg(long)]
        max_pages: Option<u32>,
        /// Only enrich the first N catalog rows
        #[arg(long)]
        max_products: Option<usize>,
    },
}

#[derive(Args)]
struct CatalogArgs {
    /// Stop after this many listing pages
    #[arg(long)]
    max_pages: Option<u32>,
    /// Concurrent listing page workers
    #[arg(long)]
    workers: Option<usize>,
    /// Catalog table to append to
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct PricesArgs {
    /// Only enrich the first N catalog rows
    #[arg(long)]
    max_products: Option<usize>,
    /// Concurrent product page workers
    #[arg(long)]
    workers: Option<usize>,
    /// Catalog table to read
    #[arg(long)]
    input: Option<PathBuf>,
    /// Price table to write
    #[arg(long)]
    output: Option<PathBuf>,
}

impl CatalogArgs {
    fn apply(self, config: &mut Config) {
        if let Some(max_pages) = self.max_pages {
            config.catalog.max_pages = Some(max_pages);
        }
        if let Some(workers) = self.workers {
            config.catalog.workers = workers;
        }
        if let Some(output) = self.output {
            config.catalog.output = output;
        }
    }
}

impl PricesArgs {
    fn apply(self, config: &mut Config) {
        if let Some(max_products) = self.max_products {
            config.prices.max_products = Some(max_products);
        }
        if let Some(workers) = self.workers {
            config.prices.workers = workers;
        }
        if let Some(input) = self.input {
            config.prices.input = input;
        }
        if let Some(output) = self.output {
            config.prices.output = output;
        }
    }
}

async fn harvest_catalog(config: &Config, source: Arc<HttpSource>) -> anyhow::Result<()> {
    let reporter: Arc<dyn ProgressReporter> = create_reporter();
    let summary = catalog::harvest(config, source, reporter.clone())
        .await
        .inspect_err(|e| {
            reporter.set_phase(BatchPhase::Failed("catalog harvest aborted".into()));
            reporter.log_error(&e.to_string());
            reporter.finish();
        })
        .with_context(|| "harvest catalog")?;
    reporter.set_phase(BatchPhase::Completed);
    reporter.log_info(&format!(
        "pages {}/{} ({} failed), {} new products, {} rows / {} unique ids in {}",
        summary.pages_processed,
        summary.pages_available,
        summary.pages_failed,
        summary.new_entries,
        summary.rows_in_table,
        summary.unique_ids,
        config.catalog.output.display()
    ));
    reporter.finish();
    Ok(())
}

async fn enrich_prices(config: &Config, source: Arc<HttpSource>) -> anyhow::Result<()> {
    let reporter: Arc<dyn ProgressReporter> = create_reporter();
    let summary = enrich::enrich(config, source, reporter.clone())
        .await
        .inspect_err(|e| {
            reporter.set_phase(BatchPhase::Failed("price enrichment aborted".into()));
            reporter.log_error(&e.to_string());
            reporter.finish();
        })
        .with_context(|| "enrich prices")?;
    reporter.set_phase(BatchPhase::Completed);
    reporter.log_info(&format!(
        "{} of {} products priced ({} without prices, {} failed), {} region columns",
        summary.resolved,
        summary.products,
        summary.unpriced,
        summary.failed,
        summary.region_columns
    ));
    reporter.finish();
    Ok(())
}

async fn run(opts: Opts) -> anyhow::Result<()> {
    let mut config = Config::load(opts.config.as_deref()).with_context(|| "load config")?;
    let (scrape, price) = match opts.command {
        Command::Catalog(args) => {
            args.apply(&mut config);
            (true, false)
        }
        Command::Prices(args) => {
            args.apply(&mut config);
            (false, true)
        }
        Command::Run {
            max_pages,
            max_products,
        } => {
            config.catalog.max_pages = max_pages.or(config.catalog.max_pages);
            config.prices.max_products = max_products.or(config.prices.max_products);
            config.prices.input = config.catalog.output.clone();
            (true, true)
        }
    };
    config.validate().with_context(|| "validate config")?;
    let source = Arc::new(HttpSource::new(&config).with_context(|| "build HTTP client")?);
    if scrape {
        harvest_catalog(&config, source.clone()).await?;
    }
    if price {
        enrich_prices(&config, source).await?;
    }
    Ok(())
}

fn main() {
    let opts = Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let started = Instant::now();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(?e, "failed to start runtime");
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(run(opts)) {
        error!(?e, "critical error");
        std::process::exit(1);
    }
    info!(elapsed = ?started.elapsed(), "done");
}
