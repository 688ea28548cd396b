//! Catalog view filtering.
//!
//! `FilterSpec` is a value object built by the settings collaborator:
//! root folders that scope the searchable view, exclude patterns that drop
//! noisy segments (`obj`, `bin`, `.svn`), and the hidden-folder switch.
//! Pattern validation happens here, at configuration time, so query paths
//! never see a regex error.

use regex::{Regex, RegexBuilder};

use crate::catalog::{identity_key, is_same_or_descendant, Catalog, FolderEntry, SEPARATORS};
use crate::error::{IndexError, Result};

/// Root-folder scoping plus exclude patterns for the searchable view.
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    root_folders: Vec<String>,
    exclude_patterns: Vec<Regex>,
    include_hidden: bool,
}

impl FilterSpec {
    /// Builds a spec, compiling the exclude patterns case-insensitively.
    ///
    /// An invalid pattern surfaces here as a configuration error, never at
    /// query time.
    pub fn new(
        root_folders: Vec<String>,
        exclude_patterns: &[String],
        include_hidden: bool,
    ) -> Result<Self> {
        let mut compiled = Vec::with_capacity(exclude_patterns.len());
        for pattern in exclude_patterns {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| IndexError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
            compiled.push(regex);
        }
        Ok(Self {
            root_folders,
            exclude_patterns: compiled,
            include_hidden,
        })
    }

    /// A spec that passes everything except hidden folders.
    pub fn permissive() -> Self {
        Self::default()
    }

    pub fn include_hidden(&self) -> bool {
        self.include_hidden
    }
}

/// Computes the filtered view of a catalog.
///
/// Inclusion: empty roots, or the entry equals / descends from some root.
/// Exclusion: any path segment matched by any exclude pattern (substring,
/// case-insensitive), or a hidden entry while hidden folders are off.
/// Order-preserving and idempotent; O(catalog) per run.
pub fn apply(catalog: &Catalog, spec: &FilterSpec) -> Vec<FolderEntry> {
    let case_insensitive = catalog.case_insensitive();
    let root_keys: Vec<String> = spec
        .root_folders
        .iter()
        .map(|root| {
            // Same trailing-separator rule as stored paths: roots like `/`
            // and `C:\` keep theirs.
            let trimmed = root.trim_end_matches(SEPARATORS);
            let normalized = if trimmed.is_empty() || trimmed.ends_with(':') {
                root.as_str()
            } else {
                trimmed
            };
            identity_key(normalized, case_insensitive)
        })
        .collect();

    catalog
        .iter()
        .filter(|entry| {
            if entry.hidden && !spec.include_hidden {
                return false;
            }
            if !root_keys.is_empty() {
                let key = identity_key(&entry.full_path, case_insensitive);
                if !root_keys
                    .iter()
                    .any(|root| is_same_or_descendant(&key, root))
                {
                    return false;
                }
            }
            if !spec.exclude_patterns.is_empty() && segment_excluded(entry, spec) {
                return false;
            }
            true
        })
        .cloned()
        .collect()
}

fn segment_excluded(entry: &FolderEntry, spec: &FilterSpec) -> bool {
    entry
        .full_path
        .split(SEPARATORS)
        .filter(|segment| !segment.is_empty())
        .any(|segment| {
            spec.exclude_patterns
                .iter()
                .any(|pattern| pattern.is_match(segment))
        })
}
