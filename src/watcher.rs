//! Live filesystem watching for directory changes.
//!
//! A `ChangeWatcher` wraps a notify `RecommendedWatcher` over one or more
//! roots and forwards directory-level create/delete/rename events through a
//! crossbeam channel. The index thread is the sole consumer and applies the
//! deltas to its owned catalog; watcher callbacks never touch shared state.
//!
//! File-level events are filtered out here where the path can still be
//! probed (creations, rename targets). Removals cannot be probed after the
//! fact, so they pass through and the merge step drops the ones that never
//! referred to a catalogued directory.

use std::path::PathBuf;

use crossbeam_channel::Sender;
use notify::event::{ModifyKind, RenameMode};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::{IndexError, Result};

/// An incremental change to the folder catalog.
///
/// The four shapes of a change notification: something appeared, something
/// vanished, something moved, or something changed in place (attributes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created(PathBuf),
    /// A path vanished. Deleted paths cannot be probed, so this may name a
    /// file that was never catalogued; consumers must treat removal of an
    /// unknown path as a no-op.
    Deleted(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
    /// Attribute-only change; old and new path are the same.
    Touched(PathBuf),
}

/// Watches roots for directory changes. One-way Stopped → Watching per
/// start/stop pair; starting twice is a programmer error.
#[derive(Debug)]
pub struct ChangeWatcher {
    report_attribute_changes: bool,
    inner: Option<RecommendedWatcher>,
}

impl ChangeWatcher {
    pub fn new(report_attribute_changes: bool) -> Self {
        Self {
            report_attribute_changes,
            inner: None,
        }
    }

    pub fn is_watching(&self) -> bool {
        self.inner.is_some()
    }

    /// Starts watching the given roots recursively, sending mapped events
    /// through `events`.
    ///
    /// Returns `WatcherAlreadyStarted` if already watching. Roots that
    /// cannot be watched are skipped with a warning; the watcher still
    /// starts if at least one root (or none at all) was requested.
    pub fn start(&mut self, roots: &[PathBuf], events: Sender<ChangeEvent>) -> Result<()> {
        if self.inner.is_some() {
            return Err(IndexError::WatcherAlreadyStarted);
        }

        let report_attribute_changes = self.report_attribute_changes;
        let mut watcher =
            recommended_watcher(move |event_result: notify::Result<Event>| match event_result {
                Ok(event) => {
                    for change in map_notify_event(&event, report_attribute_changes) {
                        // Send failure means the consumer is gone (shutdown
                        // in progress); dropping the event is fine then.
                        let _ = events.send(change);
                    }
                }
                Err(error) => {
                    log::warn!("filesystem watcher error: {error}");
                }
            })
            .map_err(|error| {
                IndexError::Watcher(format!("failed to create filesystem watcher: {error}"))
            })?;

        for root in roots {
            if let Err(error) = watcher.watch(root, RecursiveMode::Recursive) {
                log::warn!("failed to watch {}: {}; root skipped", root.display(), error);
            }
        }

        self.inner = Some(watcher);
        Ok(())
    }

    /// Stops watching. Events still in flight inside the OS notification
    /// layer may be dropped during this transition.
    pub fn stop(&mut self) {
        self.inner = None;
    }
}

/// Maps a notify event to zero or more catalog change events.
///
/// Existence probes classify creations and rename targets as directories;
/// a path that exists as a file is dropped here. Removals are forwarded
/// unprobed.
pub fn map_notify_event(event: &Event, report_attribute_changes: bool) -> Vec<ChangeEvent> {
    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .filter(|path| path.is_dir())
            .map(|path| ChangeEvent::Created(path.clone()))
            .collect(),

        EventKind::Remove(_) => event
            .paths
            .iter()
            .map(|path| ChangeEvent::Deleted(path.clone()))
            .collect(),

        EventKind::Modify(ModifyKind::Name(mode)) => map_rename(event, mode),

        EventKind::Modify(ModifyKind::Metadata(_)) if report_attribute_changes => event
            .paths
            .iter()
            .filter(|path| path.is_dir())
            .map(|path| ChangeEvent::Touched(path.clone()))
            .collect(),

        // Data writes, access events, and unclassified noise.
        _ => Vec::new(),
    }
}

fn map_rename(event: &Event, mode: &RenameMode) -> Vec<ChangeEvent> {
    match mode {
        RenameMode::Both if event.paths.len() == 2 => {
            let from = event.paths[0].clone();
            let to = event.paths[1].clone();
            if to.is_dir() {
                vec![ChangeEvent::Renamed { from, to }]
            } else if to.exists() {
                // A file rename; nothing catalogued moves.
                Vec::new()
            } else {
                // Target already gone again; the removal half still counts.
                vec![ChangeEvent::Deleted(from)]
            }
        }
        RenameMode::From => event
            .paths
            .iter()
            .map(|path| ChangeEvent::Deleted(path.clone()))
            .collect(),
        RenameMode::To => event
            .paths
            .iter()
            .filter(|path| path.is_dir())
            .map(|path| ChangeEvent::Created(path.clone()))
            .collect(),
        // Unpaired or platform-ambiguous rename: classify each path by what
        // is on disk now.
        _ => event
            .paths
            .iter()
            .map(|path| {
                if path.is_dir() {
                    ChangeEvent::Created(path.clone())
                } else {
                    ChangeEvent::Deleted(path.clone())
                }
            })
            .collect(),
    }
}
