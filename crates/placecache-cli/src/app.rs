//! Command execution over a single `LocationCacheManager`.

use std::sync::Arc;

use anyhow::{Context, Result};
use placecache_core::sync::ParentLevel;
use placecache_core::{Config, LocationCacheManager, SyncReport};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::command::{Command, SyncTarget};

pub struct App {
    cache: Arc<LocationCacheManager>,
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let cache = LocationCacheManager::from_config(&config)?;
        Ok(Self {
            cache: Arc::new(cache),
            config,
        })
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Help => {}
            Command::Stats => self.print_stats(),
            Command::Sync(target) => self.sync(target).await?,
            Command::Provinces => {
                for p in self.cache.provinces() {
                    println!("{}\t{}", p.code, p.name);
                }
            }
            Command::Districts(province_code) => {
                for d in self.cache.districts_of(province_code) {
                    println!("{}\t{}", d.code, d.name);
                }
            }
            Command::Wards(district_code) => {
                for w in self.cache.wards_of(district_code) {
                    println!("{}\t{}", w.code, w.name);
                }
            }
            Command::Export(path) => {
                let document = self.cache.export_snapshot()?;
                match path {
                    Some(path) => {
                        std::fs::write(&path, document)
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                        eprintln!("Snapshot written to {}", path.display());
                    }
                    None => println!("{}", document),
                }
            }
            Command::Import(path) => {
                let document = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let stats = self.cache.try_import_snapshot(&document)?;
                eprintln!(
                    "Imported {} provinces, {} districts, {} wards",
                    stats.total_provinces, stats.total_districts, stats.total_wards
                );
            }
            Command::Clear => {
                self.cache.clear()?;
                eprintln!("Cache cleared");
            }
        }
        Ok(())
    }

    fn print_stats(&self) {
        let stats = self.cache.stats();
        let stale = self.cache.is_stale(self.config.stale_after());
        println!("Provinces:    {}", stats.total_provinces);
        println!("Districts:    {}", stats.total_districts);
        println!("Wards:        {}", stats.total_wards);
        println!("Last updated: {}{}", stats.age_display(), if stale { " (stale)" } else { "" });

        let store = self.cache.store();
        let orphaned_districts = store.orphaned_districts().len();
        let orphaned_wards = store.orphaned_wards().len();
        if orphaned_districts > 0 || orphaned_wards > 0 {
            println!("Orphaned:     {} districts, {} wards", orphaned_districts, orphaned_wards);
        }
    }

    async fn sync(&self, target: SyncTarget) -> Result<()> {
        let printer = self.spawn_progress_printer();
        let interrupt = self.spawn_interrupt_handler();

        let result = match target {
            SyncTarget::Provinces => self.cache.sync_provinces().await,
            SyncTarget::Districts => self.cache.sync_all_districts().await,
            SyncTarget::MissingDistricts => self.cache.sync_missing_districts().await,
            SyncTarget::Wards(code) => self.cache.sync_wards_for_district(code).await,
            SyncTarget::ProvinceWards(code) => self.cache.sync_wards_for_province(code).await,
            SyncTarget::MissingWards(code) => self.cache.sync_missing_wards(code).await,
            SyncTarget::All => self.cache.sync_all().await,
        };

        interrupt.abort();
        // The printer exits on its own once the run publishes a final phase
        if result.is_err() {
            printer.abort();
        } else {
            let _ = printer.await;
        }

        let report = result?;
        print_report(&report);
        Ok(())
    }

    /// Print every progress update until the run finishes.
    fn spawn_progress_printer(&self) -> JoinHandle<()> {
        let mut rx = self.cache.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let progress = rx.borrow_and_update().clone();
                if progress.total > 0 {
                    eprintln!("[{}/{}] {}", progress.current, progress.total, progress.status);
                } else {
                    eprintln!("{}", progress.status);
                }
                if progress.is_finished() {
                    break;
                }
            }
        })
    }

    /// Ctrl-C stops the run at the next parent boundary; merged data is kept.
    fn spawn_interrupt_handler(&self) -> JoinHandle<()> {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling sync");
                eprintln!("Cancelling after the current fetch...");
                cache.cancel_sync();
            }
        })
    }
}

fn print_report(report: &SyncReport) {
    info!(summary = %report.summary(), "Sync finished");
    eprintln!("{}", report.summary());
    if report.cancelled {
        eprintln!("Run was cancelled; re-run `sync missing` to pick up where it stopped");
    }
    for level in [ParentLevel::Province, ParentLevel::District] {
        let failed = report.failed_codes(level);
        if !failed.is_empty() {
            let codes: Vec<String> = failed.iter().map(|c| c.to_string()).collect();
            eprintln!("Failed {:?} codes: {}", level, codes.join(", "));
        }
    }
}
