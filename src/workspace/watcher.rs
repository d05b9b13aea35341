//! Unified filesystem watcher: one recursive watch at the workspace root,
//! fanned out as classified events after a per-burst debounce.
//!
//! Watch errors on a subtree are logged and do not stop the watcher.

use crate::analyzer::LanguageBinding;
use crate::error::{Result, SymdexError};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_WATCH_DEBOUNCE: Duration = Duration::from_millis(100);

/// A filesystem change after ignore-filtering and classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A source file changed (created, modified, or deleted; moves arrive as
    /// one event per endpoint). Route to the owning package's indexer.
    Source(PathBuf),
    /// The dependency lockfile changed; re-evaluate resolved dependencies.
    Lockfile(PathBuf),
    /// A package manifest changed. Structural: signal only, no automatic
    /// re-discovery; callers reopen the context to pick up new members.
    Manifest(PathBuf),
}

pub struct RootWatcher {
    // Keep the native watcher alive for the lifetime of the subscription.
    _watcher: RecommendedWatcher,
    task: tokio::task::JoinHandle<()>,
}

impl RootWatcher {
    /// Starts a recursive watch rooted at `root`. Events for the same burst
    /// are coalesced inside the debounce window before classification.
    pub fn spawn(
        root: &Path,
        binding: LanguageBinding,
        debounce: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<WatchEvent>)> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Event>();
        let mut watcher = RecommendedWatcher::new(
            move |outcome: notify::Result<Event>| match outcome {
                Ok(event) => {
                    let _ = raw_tx.send(event);
                }
                Err(e) => {
                    tracing::warn!("watch error: {}", e);
                }
            },
            Config::default(),
        )
        .map_err(|e| SymdexError::Watch(e.to_string()))?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| SymdexError::Watch(e.to_string()))?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            while let Some(first) = raw_rx.recv().await {
                let mut pending: BTreeSet<PathBuf> = BTreeSet::new();
                collect_paths(&first, &mut pending);

                // Coalesce the burst: keep draining until the window closes.
                loop {
                    match tokio::time::timeout(debounce, raw_rx.recv()).await {
                        Ok(Some(event)) => collect_paths(&event, &mut pending),
                        Ok(None) => return,
                        Err(_) => break,
                    }
                }

                for path in pending {
                    if let Some(event) = classify(&path, &binding) {
                        if out_tx.send(event).is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok((
            Self {
                _watcher: watcher,
                task,
            },
            out_rx,
        ))
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for RootWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Both endpoints of a move land in `pending`, so a cross-package move
/// becomes a removal routed to the old owner and a refresh routed to the new
/// one.
fn collect_paths(event: &Event, pending: &mut BTreeSet<PathBuf>) {
    match event.kind {
        EventKind::Create(_)
        | EventKind::Modify(_)
        | EventKind::Remove(_)
        | EventKind::Any
        | EventKind::Other => {
            for path in &event.paths {
                pending.insert(path.clone());
            }
        }
        EventKind::Access(_) => {}
    }
}

fn classify(path: &Path, binding: &LanguageBinding) -> Option<WatchEvent> {
    let file_name = path.file_name()?.to_string_lossy();
    if binding.in_ignored_dir(path) {
        return None;
    }
    if file_name == binding.lockfile.as_str() {
        return Some(WatchEvent::Lockfile(path.to_path_buf()));
    }
    if file_name == binding.package_manifest.as_str() {
        return Some(WatchEvent::Manifest(path.to_path_buf()));
    }
    if binding.is_source_extension(path) && !binding.is_generated(path) {
        return Some(WatchEvent::Source(path.to_path_buf()));
    }
    None
}
