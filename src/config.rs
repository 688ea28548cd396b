//! Engine configuration.
//!
//! `IndexConfig` is a plain value object assembled by the settings
//! collaborator. It carries everything the index needs besides the filter:
//! where the cache lives, which roots to scan, and the timing knobs for
//! staleness, periodic persistence, and delayed rescans.

use std::path::PathBuf;

use chrono::Duration;

/// Configuration for the folder index engine.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Path of the on-disk catalog cache file.
    pub cache_path: PathBuf,

    /// Roots to scan and watch. Empty means the platform default roots
    /// (all local drives on Windows, `/` elsewhere).
    pub scan_roots: Vec<PathBuf>,

    /// Maximum gap between the last full scan and the last system shutdown
    /// for a loaded cache to be served without a rescan.
    pub validity_window: Duration,

    /// Number of applied deltas between out-of-band cache writes.
    pub deltas_per_save: usize,

    /// Delay before a scheduled background rescan starts.
    pub rescan_delay: std::time::Duration,

    /// Whether path identity and root matching fold case.
    /// Defaults to the host filesystem convention.
    pub case_insensitive: bool,

    /// Whether attribute-only changes (hidden flag flips) are reported by
    /// the watcher as modified-in-place events.
    pub report_attribute_changes: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            cache_path: PathBuf::from("hopdir-cache.dat"),
            scan_roots: Vec::new(),
            validity_window: Duration::seconds(120),
            deltas_per_save: 300,
            rescan_delay: std::time::Duration::from_secs(5),
            case_insensitive: cfg!(windows),
            report_attribute_changes: false,
        }
    }
}
