//! Folder catalog entity layer.
//!
//! The catalog is an ordered, de-duplicating collection of indexed folders
//! keyed by their identity key (the full path, case-folded or not per the
//! configured policy). Ordering by path means a subtree occupies a
//! contiguous key range, which keeps subtree removal a single range walk.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};

/// Path separators recognized in stored full paths.
pub const SEPARATORS: [char; 2] = ['/', '\\'];

/// One indexed folder.
///
/// Immutable once constructed; a rename produces a new entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    /// Canonical full path, no trailing separator (roots keep theirs).
    pub full_path: String,
    /// Leaf segment of the path; empty for a filesystem/drive root.
    pub name: String,
    /// Whether the folder carries the hidden attribute.
    pub hidden: bool,
}

impl FolderEntry {
    pub fn new(full_path: impl Into<String>, name: impl Into<String>, hidden: bool) -> Self {
        Self {
            full_path: full_path.into(),
            name: name.into(),
            hidden,
        }
    }

    /// Builds an entry from a filesystem path.
    ///
    /// The leaf name is empty for root paths (`/`, `C:\`), which also keep
    /// their trailing separator since stripping it would leave an ambiguous
    /// string like `C:`.
    pub fn from_path(path: &Path, hidden: bool) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let raw = path.to_string_lossy();
        let trimmed = raw.trim_end_matches(SEPARATORS);
        let full_path = if trimmed.is_empty() || trimmed.ends_with(':') {
            raw.into_owned()
        } else {
            trimmed.to_string()
        };
        Self {
            full_path,
            name,
            hidden,
        }
    }
}

/// Computes the identity key for a path under the given case policy.
pub fn identity_key(path: &str, case_insensitive: bool) -> String {
    if case_insensitive {
        path.to_lowercase()
    } else {
        path.to_string()
    }
}

/// Returns true if `key` equals `ancestor` or lies below it.
///
/// Both arguments must already be identity keys. The descendant test is a
/// separator-aware prefix match so `/foo2` is not a descendant of `/foo`.
pub fn is_same_or_descendant(key: &str, ancestor: &str) -> bool {
    if key == ancestor {
        return true;
    }
    if !key.starts_with(ancestor) {
        return false;
    }
    ancestor.ends_with(SEPARATORS) || key[ancestor.len()..].starts_with(SEPARATORS)
}

/// Ordered, de-duplicating collection of folder entries.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: BTreeMap<String, FolderEntry>,
    case_insensitive: bool,
}

impl Catalog {
    pub fn new(case_insensitive: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            case_insensitive,
        }
    }

    pub fn case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    fn key_of(&self, path: &str) -> String {
        identity_key(path, self.case_insensitive)
    }

    /// Inserts an entry unless one with the same identity already exists.
    ///
    /// The existing entry wins; this is what makes duplicate delta
    /// application idempotent. Returns true if the entry was added.
    pub fn insert(&mut self, entry: FolderEntry) -> bool {
        let key = self.key_of(&entry.full_path);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, entry);
        true
    }

    /// Inserts an entry, replacing any existing one with the same identity.
    pub fn replace(&mut self, entry: FolderEntry) {
        let key = self.key_of(&entry.full_path);
        self.entries.insert(key, entry);
    }

    /// Keys of `key` and every descendant, in order.
    fn subtree_keys(&self, key: &str) -> Vec<String> {
        self.entries
            .range(key.to_string()..)
            .take_while(|(candidate, _)| candidate.starts_with(key))
            .filter(|(candidate, _)| is_same_or_descendant(candidate, key))
            .map(|(candidate, _)| candidate.clone())
            .collect()
    }

    /// Removes the entry for `full_path` and every descendant entry.
    ///
    /// Returns the number of entries removed.
    pub fn remove_subtree(&mut self, full_path: &str) -> usize {
        let key = self.key_of(full_path);
        let doomed = self.subtree_keys(&key);
        for candidate in &doomed {
            self.entries.remove(candidate);
        }
        doomed.len()
    }

    /// Moves the entry for `from` and every descendant under `to`'s path.
    ///
    /// `to` replaces the old top entry; descendants keep their own name and
    /// hidden flag with the path prefix rewritten. Returns true if anything
    /// changed.
    pub fn rename_subtree(&mut self, from: &str, to: FolderEntry) -> bool {
        let from_key = self.key_of(from);
        let mut moved = Vec::new();
        for key in self.subtree_keys(&from_key) {
            if let Some(entry) = self.entries.remove(&key) {
                moved.push(entry);
            }
        }
        let mut changed = !moved.is_empty();
        for entry in moved {
            // Empty suffix is the old top entry itself, superseded by `to`.
            // `get` guards the prefix slice on case-insensitive catalogs
            // where the stored path's case may differ from `from`.
            match entry.full_path.get(from.len()..) {
                Some(suffix) if !suffix.is_empty() => {
                    let path = format!("{}{suffix}", to.full_path);
                    self.insert(FolderEntry::new(path, entry.name, entry.hidden));
                }
                _ => {}
            }
        }
        changed |= self.insert(to);
        changed
    }

    pub fn contains(&self, full_path: &str) -> bool {
        self.entries.contains_key(&self.key_of(full_path))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in identity-key order.
    pub fn iter(&self) -> impl Iterator<Item = &FolderEntry> {
        self.entries.values()
    }
}

/// A catalog paired with the time of the full scan that produced it.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub catalog: Catalog,
    pub last_full_scan: DateTime<Utc>,
}
