//! Progress reporting and display
//!
//! Pipelines report through the [`ProgressReporter`] trait so they stay
//! independent of how (or whether) progress is drawn.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::{Duration, Instant},
};

/// Status of a single page or product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryStatus {
    /// Waiting for the page body
    Fetching,
    /// Recovering and resolving embedded prices
    Resolving,
    /// Finished with a result
    Done,
    /// Finished without a result
    Skipped(String),
    /// Could not be fetched
    Failed(String),
}

/// Phase of a harvesting run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPhase {
    /// Reading the total product count from the first listing page
    DiscoveringCatalog,
    ScrapingPages,
    SavingCatalog,
    /// Reading catalog rows for enrichment
    LoadingCatalog,
    ExtractingPrices,
    WritingTable,
    Completed,
    Failed(String),
}

impl BatchPhase {
    fn describe(&self) -> (&'static str, &'static str) {
        match self {
            BatchPhase::DiscoveringCatalog => ("🔎", "Discovering catalog size..."),
            BatchPhase::ScrapingPages => ("📄", "Scraping listing pages..."),
            BatchPhase::SavingCatalog => ("💾", "Saving catalog..."),
            BatchPhase::LoadingCatalog => ("📋", "Loading catalog..."),
            BatchPhase::ExtractingPrices => ("💲", "Extracting prices..."),
            BatchPhase::WritingTable => ("💾", "Writing price table..."),
            BatchPhase::Completed => ("✅", "Completed!"),
            BatchPhase::Failed(_) => ("❌", "Failed"),
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn set_phase(&self, phase: BatchPhase);

    /// Register entries to track (call before processing starts).
    fn register_entries(&self, entries: Vec<String>);

    fn update_entry(&self, entry: &str, status: EntryStatus);

    /// Record how many rows were persisted.
    fn set_saved(&self, rows: usize);

    fn log_info(&self, message: &str);

    fn log_warn(&self, message: &str);

    fn log_error(&self, message: &str);

    /// Finish and clean up the display.
    fn finish(&self);
}

/// A no-op reporter for when progress display is disabled.
pub struct NullReporter;

impl ProgressReporter for NullReporter {
    fn set_phase(&self, _phase: BatchPhase) {}
    fn register_entries(&self, _entries: Vec<String>) {}
    fn update_entry(&self, _entry: &str, _status: EntryStatus) {}
    fn set_saved(&self, _rows: usize) {}
    fn log_info(&self, _message: &str) {}
    fn log_warn(&self, _message: &str) {}
    fn log_error(&self, _message: &str) {}
    fn finish(&self) {}
}

#[derive(Debug)]
struct Stats {
    total_entries: usize,
    done_entries: usize,
    skipped_entries: usize,
    failed_entries: usize,
    saved_rows: usize,
    start_time: Instant,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            total_entries: 0,
            done_entries: 0,
            skipped_entries: 0,
            failed_entries: 0,
            saved_rows: 0,
            start_time: Instant::now(),
        }
    }
}

impl Stats {
    fn count(&mut self, status: &EntryStatus) {
        match status {
            EntryStatus::Done => self.done_entries += 1,
            EntryStatus::Skipped(_) => self.skipped_entries += 1,
            EntryStatus::Failed(_) => self.failed_entries += 1,
            _ => {}
        }
    }

    fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    fn print_summary(&self) {
        eprintln!();
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!("📊 Summary");
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!("   📄 Entries:    {} total", self.total_entries);
        eprintln!("   ✅ Done:       {}", self.done_entries);
        if self.skipped_entries > 0 {
            eprintln!("   ⏭️  Skipped:    {}", self.skipped_entries);
        }
        if self.failed_entries > 0 {
            eprintln!("   ❌ Failed:     {}", self.failed_entries);
        }
        eprintln!("   💾 Saved rows: {}", self.saved_rows);
        eprintln!("   ⏱️  Duration:   {:.2}s", self.elapsed().as_secs_f64());
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }
}

/// A simple reporter that just prints to stderr (for non-TTY).
#[derive(Default)]
pub struct SimpleReporter {
    stats: RwLock<Stats>,
}

impl SimpleReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressReporter for SimpleReporter {
    fn set_phase(&self, phase: BatchPhase) {
        if let BatchPhase::Failed(ref e) = phase {
            eprintln!("❌ Failed: {e}");
            return;
        }
        let (emoji, msg) = phase.describe();
        eprintln!("{emoji} {msg}");
    }

    fn register_entries(&self, entries: Vec<String>) {
        self.stats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .total_entries = entries.len();
        eprintln!("   Queued {} entries", entries.len());
    }

    fn update_entry(&self, entry: &str, status: EntryStatus) {
        self.stats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .count(&status);
        match status {
            EntryStatus::Done => eprintln!("   ✓ {entry}"),
            EntryStatus::Skipped(ref reason) => eprintln!("   - {entry}: {reason}"),
            EntryStatus::Failed(ref e) => eprintln!("   ✗ {entry}: {e}"),
            _ => {}
        }
    }

    fn set_saved(&self, rows: usize) {
        self.stats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .saved_rows = rows;
    }

    fn log_info(&self, message: &str) {
        eprintln!("ℹ️  {message}");
    }

    fn log_warn(&self, message: &str) {
        eprintln!("⚠️  {message}");
    }

    fn log_error(&self, message: &str) {
        eprintln!("❌ {message}");
    }

    fn finish(&self) {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .print_summary();
    }
}

/// Progress bars for interactive terminals.
pub struct FancyReporter {
    multi: indicatif::MultiProgress,
    phase_bar: indicatif::ProgressBar,
    entries: RwLock<HashMap<String, Option<indicatif::ProgressBar>>>,
    main_progress: RwLock<Option<indicatif::ProgressBar>>,
    stats: RwLock<Stats>,
}

impl FancyReporter {
    pub fn new() -> Self {
        let multi = indicatif::MultiProgress::new();
        let phase_bar = multi.add(indicatif::ProgressBar::new_spinner());
        phase_bar.set_style(
            indicatif::ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        phase_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            phase_bar,
            entries: RwLock::new(HashMap::new()),
            main_progress: RwLock::new(None),
            stats: RwLock::new(Stats::default()),
        }
    }

    fn status_emoji(status: &EntryStatus) -> &'static str {
        match status {
            EntryStatus::Fetching => "🌐",
            EntryStatus::Resolving => "⚙️ ",
            EntryStatus::Done => "✅",
            EntryStatus::Skipped(_) => "⏭️ ",
            EntryStatus::Failed(_) => "❌",
        }
    }

    fn status_detail(status: &EntryStatus) -> String {
        match status {
            EntryStatus::Fetching => "fetching".to_string(),
            EntryStatus::Resolving => "resolving prices".to_string(),
            EntryStatus::Done => "done".to_string(),
            EntryStatus::Skipped(reason) => reason.clone(),
            EntryStatus::Failed(e) => e.clone(),
        }
    }
}

impl Default for FancyReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for FancyReporter {
    fn set_phase(&self, phase: BatchPhase) {
        if let BatchPhase::Failed(ref e) = phase {
            self.phase_bar
                .finish_with_message(format!("❌ Failed: {e}"));
            return;
        }
        let (emoji, msg) = phase.describe();
        let msg = format!("{emoji} {msg}");
        if matches!(phase, BatchPhase::Completed) {
            self.phase_bar.finish_with_message(msg);
        } else {
            self.phase_bar.set_message(msg);
        }
    }

    fn register_entries(&self, entries: Vec<String>) {
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let total = entries.len();
        self.stats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .total_entries = total;

        let main_pb = self.multi.add(indicatif::ProgressBar::new(total as u64));
        main_pb.set_style(
            indicatif::ProgressStyle::default_bar()
                .template("   {bar:40.cyan/blue} {pos}/{len} entries")
                .unwrap()
                .progress_chars("█▓▒░  "),
        );
        *self
            .main_progress
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(main_pb);

        // Bars are created lazily once an entry starts moving.
        map.extend(entries.into_iter().map(|entry| (entry, None)));
    }

    fn update_entry(&self, entry: &str, status: EntryStatus) {
        let mut map = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if matches!(
            status,
            EntryStatus::Done | EntryStatus::Skipped(_) | EntryStatus::Failed(_)
        ) {
            if let Some(Some(pb)) = map.remove(entry) {
                pb.finish_and_clear();
            }
            if let Some(ref main_pb) = *self
                .main_progress
                .read()
                .unwrap_or_else(PoisonError::into_inner)
            {
                main_pb.inc(1);
            }
            self.stats
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .count(&status);
            return;
        }

        if let Some(entry_slot) = map.get_mut(entry) {
            let message = format!(
                "{} {entry}: {}",
                Self::status_emoji(&status),
                Self::status_detail(&status)
            );
            match entry_slot {
                Some(pb) => pb.set_message(message),
                None => {
                    let pb = self.multi.add(indicatif::ProgressBar::new_spinner());
                    pb.set_style(
                        indicatif::ProgressStyle::default_spinner()
                            .template("   {msg}")
                            .unwrap(),
                    );
                    pb.set_message(message);
                    pb.enable_steady_tick(Duration::from_millis(100));
                    *entry_slot = Some(pb);
                }
            }
        }
    }

    fn set_saved(&self, rows: usize) {
        self.stats
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .saved_rows = rows;
    }

    fn log_info(&self, message: &str) {
        self.multi.println(format!("ℹ️  {message}")).ok();
    }

    fn log_warn(&self, message: &str) {
        self.multi.println(format!("⚠️  {message}")).ok();
    }

    fn log_error(&self, message: &str) {
        self.multi.println(format!("❌ {message}")).ok();
    }

    fn finish(&self) {
        let map = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        for pb in map.values().flatten() {
            pb.finish_and_clear();
        }
        if let Some(ref main_pb) = *self
            .main_progress
            .read()
            .unwrap_or_else(PoisonError::into_inner)
        {
            main_pb.finish_and_clear();
        }
        self.phase_bar.finish_and_clear();
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .print_summary();
    }
}

/// Create an appropriate reporter based on terminal capabilities.
pub fn create_reporter() -> Arc<dyn ProgressReporter> {
    if console::Term::stderr().is_term() {
        Arc::new(FancyReporter::new())
    } else {
        Arc::new(SimpleReporter::new())
    }
}
