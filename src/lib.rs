//! Folder indexing and fuzzy jump-to-folder search library.
//!
//! This crate provides the pieces behind a keystroke-speed folder switcher:
//! - An in-memory folder catalog with persistent cache
//! - Full filesystem scanning and live change watching
//! - Startup staleness detection against the last shutdown time
//! - Filtered views with word-start fuzzy matching over folder names

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod filter;
pub mod index;
pub mod matcher;
pub mod scanner;
pub mod staleness;
pub mod watcher;

// Re-export main types
pub use cache::CacheStore;
pub use catalog::{CacheSnapshot, Catalog, FolderEntry};
pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use filter::FilterSpec;
pub use index::{FolderIndex, Freshness, IndexStatus};
pub use matcher::{MatchResult, MatchSpan};
pub use staleness::StalenessOracle;
pub use watcher::{ChangeEvent, ChangeWatcher};
