//! FolderIndex - the orchestrator owning the authoritative catalog.
//!
//! Construction decides how the catalog starts (cache, cache + background
//! rescan, or a blocking first scan), then starts the change watcher and a
//! consumer thread that applies deltas. One mutex guards the catalog, the
//! freshness flag, the filter, and the cached view; every mutation and
//! every query read goes through it, and no I/O ever happens while it is
//! held. Scans and cache writes run on background threads and only take
//! the lock for the in-memory swap.
//!
//! The rescan race: deltas that arrive while a background scan walks the
//! disk are applied to the live catalog *and* recorded in a scan log. When
//! the scan's snapshot replaces the catalog, the log is replayed against it
//! with de-duplicating inserts, so a folder created mid-scan lands exactly
//! once whether or not the walk happened to observe it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::cache::CacheStore;
use crate::catalog::{CacheSnapshot, Catalog, FolderEntry};
use crate::config::IndexConfig;
use crate::error::{lock_poisoned_error, Result};
use crate::filter::{self, FilterSpec};
use crate::matcher::{self, MatchResult};
use crate::scanner;
use crate::staleness::StalenessOracle;
use crate::watcher::{ChangeEvent, ChangeWatcher};

/// Whether the current catalog can be trusted without a rescan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

impl Freshness {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
        }
    }
}

/// Diagnostic snapshot of the index.
#[derive(Debug, Clone)]
pub struct IndexStatus {
    pub state: &'static str,
    pub entries: usize,
    pub last_full_scan: DateTime<Utc>,
    pub scanning: bool,
}

/// Everything guarded by the single index lock.
struct IndexState {
    catalog: Catalog,
    last_full_scan: DateTime<Utc>,
    freshness: Freshness,
    filter: FilterSpec,
    view: Option<Arc<Vec<FolderEntry>>>,
    deltas_since_save: usize,
    /// Present while a background scan runs; records deltas for replay.
    scan_log: Option<Vec<ChangeEvent>>,
}

struct IndexCore {
    config: IndexConfig,
    store: CacheStore,
    state: Mutex<IndexState>,
    scan_running: AtomicBool,
    shutting_down: AtomicBool,
}

impl IndexCore {
    /// Applies one watcher delta under the lock; persists out-of-band when
    /// the delta counter reaches the configured threshold.
    fn apply_event(&self, event: ChangeEvent) {
        let save_snapshot = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            if let Some(scan_log) = state.scan_log.as_mut() {
                scan_log.push(event.clone());
            }
            let applied = apply_to_catalog(&mut state.catalog, &event);
            if !applied {
                None
            } else {
                state.view = None;
                state.deltas_since_save += 1;
                if state.deltas_since_save >= self.config.deltas_per_save {
                    state.deltas_since_save = 0;
                    Some(CacheSnapshot {
                        catalog: state.catalog.clone(),
                        last_full_scan: state.last_full_scan,
                    })
                } else {
                    None
                }
            }
        };

        if let Some(snapshot) = save_snapshot {
            if let Err(error) = self.store.save(&snapshot) {
                log::warn!("periodic cache write failed: {error}");
            }
        }
    }
}

/// Applies one change event to a catalog. Returns true if anything changed.
///
/// Creations insert-unless-present (duplicate application is a no-op),
/// deletions take the whole subtree, renames re-key the subtree onto the
/// new prefix so descendants survive the move, and attribute touches
/// replace the entry to pick up the new hidden flag.
fn apply_to_catalog(catalog: &mut Catalog, event: &ChangeEvent) -> bool {
    match event {
        ChangeEvent::Created(path) => {
            catalog.insert(FolderEntry::from_path(path, scanner::is_hidden(path)))
        }
        ChangeEvent::Deleted(path) => {
            let stored = FolderEntry::from_path(path, false).full_path;
            catalog.remove_subtree(&stored) > 0
        }
        ChangeEvent::Renamed { from, to } => {
            let stored = FolderEntry::from_path(from, false).full_path;
            catalog.rename_subtree(&stored, FolderEntry::from_path(to, scanner::is_hidden(to)))
        }
        ChangeEvent::Touched(path) => {
            catalog.replace(FolderEntry::from_path(path, scanner::is_hidden(path)));
            true
        }
    }
}

/// Swaps a completed scan's catalog in and replays the recorded deltas
/// against it, leaving the state Fresh with an invalidated view.
fn install_scan_results(state: &mut IndexState, catalog: Catalog, scan_time: DateTime<Utc>) {
    state.catalog = catalog;
    state.last_full_scan = scan_time;
    let replay = state.scan_log.take().unwrap_or_default();
    for event in &replay {
        apply_to_catalog(&mut state.catalog, event);
    }
    state.freshness = Freshness::Fresh;
    state.view = None;
    state.deltas_since_save = 0;
}

/// Runs a full scan off-lock and installs the result.
///
/// A failed scan (nothing indexed) keeps the previous catalog serving and,
/// when allowed, schedules one retry. Never fatal.
fn run_background_scan(core: &Arc<IndexCore>, allow_retry: bool) {
    if core.shutting_down.load(Ordering::Relaxed) {
        return;
    }
    if core.scan_running.swap(true, Ordering::SeqCst) {
        return;
    }

    if let Ok(mut state) = core.state.lock() {
        state.scan_log = Some(Vec::new());
    }

    let started = Instant::now();
    let catalog = scanner::scan(&core.config.scan_roots, core.config.case_insensitive);
    let scan_time = Utc::now();

    if catalog.is_empty() {
        log::warn!("full scan produced no entries; keeping previous catalog");
        if let Ok(mut state) = core.state.lock() {
            state.scan_log = None;
        }
        core.scan_running.store(false, Ordering::SeqCst);
        if allow_retry {
            drop(schedule_scan(
                core.clone(),
                core.config.rescan_delay,
                false,
            ));
        }
        return;
    }

    let snapshot = match core.state.lock() {
        Ok(mut state) => {
            // Checked under the state lock: once shutdown raises the flag
            // and takes this lock for its final snapshot, no scan result
            // may be installed or saved behind it.
            if core.shutting_down.load(Ordering::SeqCst) {
                state.scan_log = None;
                None
            } else {
                install_scan_results(&mut state, catalog, scan_time);
                Some(CacheSnapshot {
                    catalog: state.catalog.clone(),
                    last_full_scan: scan_time,
                })
            }
        }
        Err(_) => None,
    };
    core.scan_running.store(false, Ordering::SeqCst);

    let Some(snapshot) = snapshot else {
        return;
    };

    if core.shutting_down.load(Ordering::SeqCst) {
        // Already installed in memory; the shutdown save covers it.
        return;
    }
    if let Err(error) = core.store.save(&snapshot) {
        log::warn!("cache write after scan failed: {error}");
    }
    log::info!(
        "full scan complete entries={} elapsed_ms={}",
        snapshot.catalog.len(),
        started.elapsed().as_millis()
    );
}

/// Delayed one-shot scan; the delay aborts promptly on shutdown.
fn schedule_scan(core: Arc<IndexCore>, delay: Duration, allow_retry: bool) -> JoinHandle<()> {
    thread::spawn(move || {
        if cancellable_sleep(&core.shutting_down, delay) {
            run_background_scan(&core, allow_retry);
        }
    })
}

/// Sleeps in short slices so shutdown is noticed quickly. Returns false if
/// the flag was raised before the delay elapsed.
fn cancellable_sleep(flag: &AtomicBool, total: Duration) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if flag.load(Ordering::Relaxed) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        thread::sleep(remaining.min(Duration::from_millis(50)));
    }
}

/// The folder index: loads or builds the catalog, keeps it current from
/// watcher deltas, and answers fuzzy queries over the filtered view.
pub struct FolderIndex {
    core: Arc<IndexCore>,
    watcher: Mutex<ChangeWatcher>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    shutdown_done: AtomicBool,
}

impl FolderIndex {
    /// Opens the index.
    ///
    /// With no usable cache this blocks on a full scan (first run only), so
    /// callers always start from a populated catalog. A stale cache serves
    /// immediately while a rescan is scheduled in the background.
    pub fn open(
        config: IndexConfig,
        filter: FilterSpec,
        last_shutdown: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let opened = Instant::now();
        let store = CacheStore::new(&config.cache_path, config.case_insensitive);
        let oracle = StalenessOracle::new(config.validity_window);

        let (snapshot, freshness, from_cache) = match store.load() {
            Some(snapshot) => {
                let usable = oracle.is_usable(snapshot.last_full_scan, last_shutdown);
                let freshness = if usable {
                    Freshness::Fresh
                } else {
                    Freshness::Stale
                };
                (snapshot, freshness, true)
            }
            None => {
                let catalog = scanner::scan(&config.scan_roots, config.case_insensitive);
                let snapshot = CacheSnapshot {
                    catalog,
                    last_full_scan: Utc::now(),
                };
                (snapshot, Freshness::Fresh, false)
            }
        };

        log::info!(
            "folder index init cache_loaded={} entries={} state={} elapsed_ms={}",
            from_cache,
            snapshot.catalog.len(),
            freshness.as_str(),
            opened.elapsed().as_millis()
        );

        if !from_cache {
            if let Err(error) = store.save(&snapshot) {
                log::warn!("initial cache write failed: {error}");
            }
        }

        let core = Arc::new(IndexCore {
            state: Mutex::new(IndexState {
                catalog: snapshot.catalog,
                last_full_scan: snapshot.last_full_scan,
                freshness,
                filter,
                view: None,
                deltas_since_save: 0,
                scan_log: None,
            }),
            store,
            config,
            scan_running: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        });

        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let mut watcher = ChangeWatcher::new(core.config.report_attribute_changes);
        let roots = scanner::effective_roots(&core.config.scan_roots);
        if let Err(error) = watcher.start(&roots, event_tx) {
            // Queries still work; the catalog just drifts until the next
            // full scan.
            log::warn!("change watcher disabled: {error}");
        }

        let consumer_core = core.clone();
        let consumer = thread::spawn(move || {
            // Ends when the watcher (the only sender) is dropped.
            for event in event_rx {
                consumer_core.apply_event(event);
            }
        });

        if freshness == Freshness::Stale {
            drop(schedule_scan(core.clone(), core.config.rescan_delay, true));
        }

        Ok(Self {
            core,
            watcher: Mutex::new(watcher),
            consumer: Mutex::new(Some(consumer)),
            shutdown_done: AtomicBool::new(false),
        })
    }

    /// Fuzzy-searches the filtered view. Never fails: in the worst case the
    /// result is simply empty.
    pub fn get_matches(&self, query: &str) -> Vec<MatchResult> {
        let view = {
            let Ok(mut state) = self.core.state.lock() else {
                return Vec::new();
            };
            if state.view.is_none() {
                let computed = Arc::new(filter::apply(&state.catalog, &state.filter));
                state.view = Some(computed);
            }
            match state.view.as_ref() {
                Some(view) => Arc::clone(view),
                None => return Vec::new(),
            }
        };
        // Matching runs outside the lock on the snapshot just taken.
        matcher::search(&view, query)
    }

    /// Replaces the filter spec atomically and invalidates the cached view.
    pub fn update_filter(&self, spec: FilterSpec) -> Result<()> {
        let mut state = self
            .core
            .state
            .lock()
            .map_err(|_| lock_poisoned_error("folder index state"))?;
        state.filter = spec;
        state.view = None;
        Ok(())
    }

    /// Reports the current index state for diagnostics.
    pub fn status(&self) -> Result<IndexStatus> {
        let state = self
            .core
            .state
            .lock()
            .map_err(|_| lock_poisoned_error("folder index state"))?;
        Ok(IndexStatus {
            state: state.freshness.as_str(),
            entries: state.catalog.len(),
            last_full_scan: state.last_full_scan,
            scanning: self.core.scan_running.load(Ordering::Relaxed),
        })
    }

    /// Triggers an immediate background rescan.
    pub fn rescan_now(&self) {
        drop(schedule_scan(self.core.clone(), Duration::ZERO, false));
    }

    /// Stops the watcher, drains in-flight deltas, and writes the final
    /// cache snapshot. The scan stamp is refreshed only when the catalog is
    /// Fresh. Idempotent; also invoked on drop.
    pub fn shutdown(&self) {
        if self.shutdown_done.swap(true, Ordering::SeqCst) {
            return;
        }
        self.core.shutting_down.store(true, Ordering::SeqCst);

        if let Ok(mut watcher) = self.watcher.lock() {
            watcher.stop();
        }
        if let Ok(mut consumer) = self.consumer.lock() {
            if let Some(handle) = consumer.take() {
                let _ = handle.join();
            }
        }

        let snapshot = match self.core.state.lock() {
            Ok(mut state) => {
                if state.freshness == Freshness::Fresh {
                    state.last_full_scan = Utc::now();
                }
                Some(CacheSnapshot {
                    catalog: state.catalog.clone(),
                    last_full_scan: state.last_full_scan,
                })
            }
            Err(_) => None,
        };
        if let Some(snapshot) = snapshot {
            match self.core.store.save(&snapshot) {
                Ok(()) => log::info!("folder index shutdown entries={}", snapshot.catalog.len()),
                Err(error) => log::warn!("final cache write failed: {error}"),
            }
        }
    }
}

impl Drop for FolderIndex {
    fn drop(&mut self) {
        self.shutdown();
    }
}
