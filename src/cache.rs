//! Catalog persistence - cache read/write operations.
//!
//! The cache is a flat text file, one folder per line, fields separated by
//! a NUL byte (invalid inside a path on every supported OS). The first line
//! is a header carrying the format version and the last-full-scan stamp:
//!
//! ```text
//! v1<SEP><rfc3339 timestamp>
//! <full_path><SEP><name><SEP><0|1>
//! ```
//!
//! Writes go through a temp file and an atomic rename; an internal mutex
//! serializes save against load so neither ever observes a half-written
//! file. Corrupt caches are reported as absent, never as errors.

use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::catalog::{CacheSnapshot, Catalog, FolderEntry};
use crate::error::{lock_poisoned_error, IndexError, Result};

/// Field separator. NUL cannot occur in a valid filesystem path.
pub const FIELD_SEP: char = '\u{0}';

/// Cache format version tag, first field of the header line.
const CACHE_VERSION: &str = "v1";

/// Reads and writes the on-disk catalog cache.
#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    case_insensitive: bool,
    io_lock: Mutex<()>,
}

impl CacheStore {
    pub fn new(path: impl Into<PathBuf>, case_insensitive: bool) -> Self {
        Self {
            path: path.into(),
            case_insensitive,
            io_lock: Mutex::new(()),
        }
    }

    /// Writes a snapshot to the cache file atomically.
    pub fn save(&self, snapshot: &CacheSnapshot) -> Result<()> {
        let _guard = self
            .io_lock
            .lock()
            .map_err(|_| lock_poisoned_error("cache store"))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|error| {
                    IndexError::Cache(format!(
                        "failed to create cache directory {}: {error}",
                        parent.display()
                    ))
                })?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let output = File::create(&tmp_path).map_err(|error| {
                IndexError::Cache(format!(
                    "failed to create cache file {}: {error}",
                    tmp_path.display()
                ))
            })?;
            let mut output = BufWriter::new(output);

            let stamp = snapshot
                .last_full_scan
                .to_rfc3339_opts(SecondsFormat::Secs, true);
            writeln!(output, "{CACHE_VERSION}{FIELD_SEP}{stamp}")?;
            for entry in snapshot.catalog.iter() {
                writeln!(
                    output,
                    "{}{FIELD_SEP}{}{FIELD_SEP}{}",
                    entry.full_path,
                    entry.name,
                    if entry.hidden { '1' } else { '0' },
                )?;
            }
            output.flush()?;
        }

        fs::rename(&tmp_path, &self.path).map_err(|error| {
            IndexError::Cache(format!(
                "failed to finalize cache file {}: {error}",
                self.path.display()
            ))
        })?;

        log::debug!(
            "wrote catalog cache to {} ({} entries)",
            self.path.display(),
            snapshot.catalog.len()
        );
        Ok(())
    }

    /// Loads the cached snapshot.
    ///
    /// Returns `None` when the file is missing, unreadable, or corrupt.
    /// Malformed entry lines are skipped; a bad header discards the file.
    pub fn load(&self) -> Option<CacheSnapshot> {
        let _guard = self.io_lock.lock().ok()?;

        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == ErrorKind::NotFound => return None,
            Err(error) => {
                log::warn!("cache read failed for {}: {}", self.path.display(), error);
                return None;
            }
        };

        let mut lines = text.lines();
        let header = lines.next()?;
        let last_full_scan = match parse_header(header) {
            Some(stamp) => stamp,
            None => {
                log::warn!("cache header invalid in {}; ignoring file", self.path.display());
                return None;
            }
        };

        let mut catalog = Catalog::new(self.case_insensitive);
        let mut skipped = 0usize;
        for line in lines {
            if line.is_empty() {
                continue;
            }
            match parse_entry(line) {
                Some(entry) => {
                    catalog.insert(entry);
                }
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            log::warn!(
                "cache {} contained {} malformed lines (skipped)",
                self.path.display(),
                skipped
            );
        }

        log::debug!(
            "loaded catalog cache from {} ({} entries)",
            self.path.display(),
            catalog.len()
        );
        Some(CacheSnapshot {
            catalog,
            last_full_scan,
        })
    }
}

fn parse_header(line: &str) -> Option<DateTime<Utc>> {
    let (version, stamp) = line.split_once(FIELD_SEP)?;
    if version != CACHE_VERSION {
        return None;
    }
    DateTime::parse_from_rfc3339(stamp)
        .ok()
        .map(|value| value.with_timezone(&Utc))
}

fn parse_entry(line: &str) -> Option<FolderEntry> {
    let mut fields = line.split(FIELD_SEP);
    let full_path = fields.next()?;
    let name = fields.next()?;
    let hidden = match fields.next()? {
        "0" => false,
        "1" => true,
        _ => return None,
    };
    if fields.next().is_some() || full_path.is_empty() {
        return None;
    }
    Some(FolderEntry::new(full_path, name, hidden))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn snapshot_with(paths: &[&str]) -> CacheSnapshot {
        let mut catalog = Catalog::new(false);
        for path in paths {
            let name = path.rsplit('/').next().unwrap_or_default();
            catalog.insert(FolderEntry::new(*path, name, false));
        }
        CacheSnapshot {
            catalog,
            last_full_scan: Utc.with_ymd_and_hms(2024, 5, 4, 12, 30, 45).unwrap(),
        }
    }

    #[test]
    fn missing_file_is_none() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path().join("cache.dat"), false);
        assert!(store.load().is_none());
    }

    #[test]
    fn round_trip() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path().join("cache.dat"), false);
        let snapshot = snapshot_with(&["/a", "/a/b", "/a/my docs"]);

        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.last_full_scan, snapshot.last_full_scan);
        assert_eq!(loaded.catalog.len(), 3);
        let paths: Vec<_> = loaded.catalog.iter().map(|e| e.full_path.clone()).collect();
        assert_eq!(paths, vec!["/a", "/a/b", "/a/my docs"]);
    }

    #[test]
    fn round_trip_truncates_subseconds() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path().join("cache.dat"), false);
        let mut snapshot = snapshot_with(&["/a"]);
        snapshot.last_full_scan = Utc.with_ymd_and_hms(2024, 5, 4, 12, 30, 45).unwrap()
            + chrono::Duration::milliseconds(750);

        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(
            loaded.last_full_scan,
            Utc.with_ymd_and_hms(2024, 5, 4, 12, 30, 45).unwrap()
        );
    }

    #[test]
    fn hidden_flag_round_trips() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path().join("cache.dat"), false);
        let mut catalog = Catalog::new(false);
        catalog.insert(FolderEntry::new("/h/.secret", ".secret", true));
        let snapshot = CacheSnapshot {
            catalog,
            last_full_scan: Utc::now(),
        };

        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap();
        assert!(loaded.catalog.iter().next().unwrap().hidden);
    }

    #[test]
    fn corrupt_header_is_none() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.dat");
        fs::write(&path, "not a header\n/a\u{0}a\u{0}0\n").unwrap();

        let store = CacheStore::new(path, false);
        assert!(store.load().is_none());
    }

    #[test]
    fn malformed_entry_lines_are_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache.dat");
        let body = format!(
            "v1{s}2024-05-04T12:30:45Z\n/a{s}a{s}0\ngarbage line\n/b{s}b{s}2\n/c{s}c{s}1\n",
            s = FIELD_SEP
        );
        fs::write(&path, body).unwrap();

        let store = CacheStore::new(path, false);
        let loaded = store.load().unwrap();
        assert_eq!(loaded.catalog.len(), 2);
        assert!(loaded.catalog.contains("/a"));
        assert!(loaded.catalog.contains("/c"));
    }

    #[test]
    fn save_replaces_previous_contents() {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::new(temp.path().join("cache.dat"), false);

        store.save(&snapshot_with(&["/old", "/old/deep"])).unwrap();
        store.save(&snapshot_with(&["/new"])).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.catalog.len(), 1);
        assert!(loaded.catalog.contains("/new"));
    }
}
