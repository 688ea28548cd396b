//! Startup staleness policy for a loaded catalog cache.
//!
//! A cache written essentially at the last system shutdown can be trusted:
//! nothing changed on disk while the machine was off and the watcher covers
//! everything since boot. A cache written long before the shutdown missed
//! an unknown stretch of live mutation and must be rescanned (it is still
//! served in the meantime; stale beats empty).

use chrono::{DateTime, Duration, Utc};

/// Decides whether a persisted snapshot may serve without a rescan.
#[derive(Debug, Clone, Copy)]
pub struct StalenessOracle {
    validity_window: Duration,
}

impl StalenessOracle {
    pub fn new(validity_window: Duration) -> Self {
        Self { validity_window }
    }

    /// Returns true when the gap between the snapshot's scan time and the
    /// last system shutdown is inside the validity window.
    ///
    /// An unknown shutdown time fails closed: the snapshot is treated as
    /// stale. A scan stamped after the recorded shutdown is trivially fresh.
    pub fn is_usable(
        &self,
        last_full_scan: DateTime<Utc>,
        last_shutdown: Option<DateTime<Utc>>,
    ) -> bool {
        match last_shutdown {
            Some(shutdown) => shutdown - last_full_scan < self.validity_window,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn oracle() -> StalenessOracle {
        StalenessOracle::new(Duration::seconds(120))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn scan_just_before_shutdown_is_usable() {
        assert!(oracle().is_usable(at(0), Some(at(30))));
    }

    #[test]
    fn scan_long_before_shutdown_is_stale() {
        // Shutdown three days after the last scan.
        assert!(!oracle().is_usable(at(0), Some(at(3 * 24 * 3600))));
    }

    #[test]
    fn window_boundary_is_exclusive() {
        assert!(!oracle().is_usable(at(0), Some(at(120))));
        assert!(oracle().is_usable(at(0), Some(at(119))));
    }

    #[test]
    fn scan_after_shutdown_is_usable() {
        assert!(oracle().is_usable(at(100), Some(at(0))));
    }

    #[test]
    fn unknown_shutdown_time_is_stale() {
        assert!(!oracle().is_usable(at(0), None));
    }
}
