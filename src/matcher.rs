//! Word-start fuzzy matching over folder names.
//!
//! The query is split on whitespace into fragments and compiled into a
//! single regex over the folder's display name (never its path):
//!
//! - A fragment must start at a word start: a word boundary followed by its
//!   first character in either case, or the character's upper-case form
//!   mid-token (the camelCase hump, so `dO` finds the `D` in `myDoc`).
//! - The remaining characters of a fragment match case-insensitively.
//! - Between fragments the target may spend the rest of the current token
//!   plus whitespace before the next word start, or jump straight to a hump
//!   inside the same token.
//!
//! This is boundary-anchored substring matching, not edit-distance search:
//! a name either satisfies the whole fragment sequence in order or it is
//! excluded. Span offsets are UTF-8 byte offsets from the regex engine and
//! therefore always `char` boundaries.

use regex::Regex;

use crate::catalog::FolderEntry;

/// A contiguous piece of a folder name, matched or not, for highlighting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpan {
    pub text: String,
    pub matched: bool,
}

impl MatchSpan {
    fn new(text: impl Into<String>, matched: bool) -> Self {
        Self {
            text: text.into(),
            matched,
        }
    }
}

/// One ranked match: the name split into spans, with the full path appended
/// as a trailing unmatched span for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub full_path: String,
    pub spans: Vec<MatchSpan>,
}

/// Compiles a query into the fragment-sequence pattern.
///
/// Returns `None` for blank queries.
pub fn build_pattern(query: &str) -> Option<Regex> {
    let fragments: Vec<&str> = query.split_whitespace().collect();
    if fragments.is_empty() {
        return None;
    }

    let mut pattern = String::new();
    for (index, fragment) in fragments.iter().enumerate() {
        let mut chars = fragment.chars();
        let first = chars.next()?;
        pattern.push_str(&fragment_start(first, index == 0));
        for c in chars {
            let escaped = regex::escape(&c.to_string());
            pattern.push_str(&format!("(?i:{escaped})"));
        }
    }

    // The pattern is built from escaped characters and fixed scaffolding;
    // compilation only fails on pathological query sizes.
    Regex::new(&pattern).ok()
}

/// Builds the word-start pattern for a fragment's first character.
fn fragment_start(c: char, first_fragment: bool) -> String {
    let escaped = regex::escape(&c.to_string());
    let boundary = if c.is_alphanumeric() {
        format!(r"\b(?i:{escaped})")
    } else {
        // Word boundaries are meaningless next to punctuation; match the
        // literal anywhere.
        escaped.clone()
    };

    let upper: String = c.to_uppercase().collect();
    let has_case = c.to_lowercase().to_string() != upper;
    let hump = regex::escape(&upper);

    if first_fragment {
        if has_case {
            format!("(?:{boundary}|{hump})")
        } else {
            boundary
        }
    } else if has_case {
        // Next token (skip rest of this one plus whitespace), or a camel
        // hump later in the same token.
        format!(r"(?:\S*\s+{boundary}|\S*{hump})")
    } else {
        format!(r"\S*\s+{boundary}")
    }
}

/// Runs the query over a filtered view, returning ranked, span-annotated
/// matches. Empty query or view yields no results.
pub fn search(view: &[FolderEntry], query: &str) -> Vec<MatchResult> {
    let Some(pattern) = build_pattern(query) else {
        return Vec::new();
    };

    let mut results: Vec<MatchResult> = view
        .iter()
        .filter_map(|entry| {
            let found = pattern.find(&entry.name)?;
            Some(annotate(entry, found.start(), found.end()))
        })
        .collect();

    // Shorter and shallower paths surface first.
    results.sort_by(|a, b| {
        a.full_path
            .len()
            .cmp(&b.full_path.len())
            .then_with(|| a.full_path.cmp(&b.full_path))
    });
    results
}

fn annotate(entry: &FolderEntry, start: usize, end: usize) -> MatchResult {
    let name = &entry.name;
    let mut spans = Vec::with_capacity(4);
    if start > 0 {
        spans.push(MatchSpan::new(&name[..start], false));
    }
    spans.push(MatchSpan::new(&name[start..end], true));
    if end < name.len() {
        spans.push(MatchSpan::new(&name[end..], false));
    }
    spans.push(MatchSpan::new(entry.full_path.clone(), false));
    MatchResult {
        full_path: entry.full_path.clone(),
        spans,
    }
}
