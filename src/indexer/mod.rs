//! Incremental indexer: owns one `SymbolIndex` and keeps it in sync with the
//! filesystem through an analyzer adapter.
//!
//! Lifecycle: `open` loads the cached artifact when it is still valid,
//! otherwise builds fresh and persists. After that, `refresh_file` calls are
//! serialized through an internal gate, each one an atomic step on the index.
//! Persistence after a refresh is debounced so a burst of changes produces a
//! single save.

use crate::analyzer::AnalyzerAdapter;
use crate::error::{Result, SymdexError};
use crate::index::persist;
use crate::index::{IndexStats, SymbolIndex};
use crate::model::DocumentRecord;
use crate::registry::cache::{CacheLayout, DirLock};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex, RwLock};

pub type SharedIndex = Arc<RwLock<SymbolIndex>>;

pub const DEFAULT_PERSIST_DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub enum IndexUpdate {
    Initial {
        file_count: usize,
        symbol_count: usize,
        from_cache: bool,
        duration: Duration,
    },
    FileUpdated {
        path: PathBuf,
        symbol_count: usize,
    },
    FileRemoved {
        path: PathBuf,
    },
    Error {
        message: String,
        path: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct InitialReport {
    pub file_count: usize,
    pub symbol_count: usize,
    pub from_cache: bool,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub use_cache: bool,
    /// Artifact directory override; defaults to the global cache's
    /// per-project slot.
    pub persist_dir: Option<PathBuf>,
    pub persist_debounce: Duration,
    pub manifest_kind: String,
    pub package_name: String,
    pub package_version: Option<String>,
}

impl IndexerOptions {
    pub fn for_package(name: impl Into<String>) -> Self {
        Self {
            use_cache: true,
            persist_dir: None,
            persist_debounce: DEFAULT_PERSIST_DEBOUNCE,
            manifest_kind: "package".to_string(),
            package_name: name.into(),
            package_version: None,
        }
    }
}

struct Inner {
    package_root: PathBuf,
    adapter: Arc<dyn AnalyzerAdapter>,
    index: SharedIndex,
    events: broadcast::Sender<IndexUpdate>,
    /// Serializes refreshes so index-update events arrive in causal order.
    refresh_gate: Mutex<()>,
    dirty: AtomicBool,
    persist_scheduled: AtomicBool,
    disposed: AtomicBool,
    persist_dir: PathBuf,
    options: IndexerOptions,
}

#[derive(Clone)]
pub struct IncrementalIndexer {
    inner: Arc<Inner>,
    initial: InitialReport,
}

impl IncrementalIndexer {
    pub async fn open(
        package_root: PathBuf,
        adapter: Arc<dyn AnalyzerAdapter>,
        options: IndexerOptions,
    ) -> Result<Self> {
        let persist_dir = options
            .persist_dir
            .clone()
            .unwrap_or_else(|| CacheLayout::from_env().project_dir(&package_root));

        let start = Instant::now();
        let mut from_cache = false;
        let mut index = None;

        if options.use_cache && persist::artifact_exists(&persist_dir) {
            let adapter_for_load = Arc::clone(&adapter);
            let dir = persist_dir.clone();
            let root = package_root.clone();
            let loaded = tokio::task::spawn_blocking(move || {
                load_valid_cache(&dir, &root, adapter_for_load.as_ref())
            })
            .await
            .map_err(|e| SymdexError::Internal(e.to_string()))?;
            if let Some(cached) = loaded {
                index = Some(cached);
                from_cache = true;
            }
        }

        let mut build_errors = Vec::new();
        let index = match index {
            Some(index) => index,
            None => {
                let adapter_for_build = Arc::clone(&adapter);
                let root = package_root.clone();
                let (built, errors) = tokio::task::spawn_blocking(move || {
                    build_full_index(&root, adapter_for_build.as_ref())
                })
                .await
                .map_err(|e| SymdexError::Internal(e.to_string()))?;
                build_errors = errors;
                built
            }
        };

        let initial = InitialReport {
            file_count: index.stats().files,
            symbol_count: index.stats().symbols,
            from_cache,
            duration: start.elapsed(),
        };

        let (events, _) = broadcast::channel(256);
        let inner = Arc::new(Inner {
            package_root,
            adapter,
            index: Arc::new(RwLock::new(index)),
            events,
            refresh_gate: Mutex::new(()),
            dirty: AtomicBool::new(false),
            persist_scheduled: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            persist_dir,
            options,
        });

        let indexer = Self { inner, initial };
        for (path, message) in build_errors {
            indexer.emit(IndexUpdate::Error {
                message,
                path: Some(path),
            });
        }
        if !from_cache {
            indexer.persist().await?;
        }
        indexer.emit(IndexUpdate::Initial {
            file_count: initial.file_count,
            symbol_count: initial.symbol_count,
            from_cache,
            duration: initial.duration,
        });
        Ok(indexer)
    }

    pub fn package_root(&self) -> &Path {
        &self.inner.package_root
    }

    pub fn persist_dir(&self) -> &Path {
        &self.inner.persist_dir
    }

    pub fn initial_report(&self) -> InitialReport {
        self.initial
    }

    /// Shared handle to the owned index; the federation layer borrows this.
    pub fn index(&self) -> SharedIndex {
        Arc::clone(&self.inner.index)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IndexUpdate> {
        self.inner.events.subscribe()
    }

    pub async fn stats(&self) -> IndexStats {
        self.inner.index.read().await.stats()
    }

    pub async fn signature_of(&self, symbol: &crate::model::SymbolId) -> Option<String> {
        self.inner
            .index
            .read()
            .await
            .get_symbol(symbol)
            .and_then(|info| info.signature_hint.clone())
    }

    /// Re-resolves one file and applies the result as a single atomic step.
    ///
    /// Non-indexable paths are ignored. Analyzer failures are transient: the
    /// file keeps its previously-known facts and an `Error` event is emitted.
    pub async fn refresh_file(&self, path: &Path) -> Result<()> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(SymdexError::IndexerDisposed);
        }
        let binding = self.inner.adapter.binding();
        if !binding.is_indexable(path) {
            return Ok(());
        }
        let Some(relative) = relative_key(&self.inner.package_root, path) else {
            return Ok(());
        };

        let _gate = self.inner.refresh_gate.lock().await;

        let adapter = Arc::clone(&self.inner.adapter);
        let owned_path = path.to_path_buf();
        let resolved = tokio::task::spawn_blocking(move || adapter.resolve_unit(&owned_path))
            .await
            .map_err(|e| SymdexError::Internal(e.to_string()))?;

        match resolved {
            Err(e) => {
                self.emit(IndexUpdate::Error {
                    message: e.to_string(),
                    path: Some(path.to_path_buf()),
                });
            }
            Ok(Some(record)) => {
                let symbol_count = record.symbols.len();
                let outcome = {
                    let mut index = self.inner.index.write().await;
                    index.update_document(&relative, record)
                };
                match outcome {
                    Ok(()) => {
                        self.emit(IndexUpdate::FileUpdated {
                            path: path.to_path_buf(),
                            symbol_count,
                        });
                        self.mark_dirty();
                    }
                    Err(e) => {
                        // Malformed facts: drop the record, keep the index
                        // consistent, report.
                        self.inner.index.write().await.remove_document(&relative);
                        self.emit(IndexUpdate::Error {
                            message: e.to_string(),
                            path: Some(path.to_path_buf()),
                        });
                        self.mark_dirty();
                    }
                }
            }
            Ok(None) => {
                let removed = self.inner.index.write().await.remove_document(&relative);
                if removed {
                    self.emit(IndexUpdate::FileRemoved {
                        path: path.to_path_buf(),
                    });
                    self.mark_dirty();
                }
            }
        }
        Ok(())
    }

    /// Full re-enumeration: refreshes every current source file and drops
    /// documents whose files disappeared.
    pub async fn refresh_all(&self) -> Result<()> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(SymdexError::IndexerDisposed);
        }
        let _gate = self.inner.refresh_gate.lock().await;
        let start = Instant::now();

        let adapter = Arc::clone(&self.inner.adapter);
        let root = self.inner.package_root.clone();
        let (rebuilt, errors) =
            tokio::task::spawn_blocking(move || build_full_index(&root, adapter.as_ref()))
                .await
                .map_err(|e| SymdexError::Internal(e.to_string()))?;

        let (file_count, symbol_count) = {
            let mut index = self.inner.index.write().await;
            *index = rebuilt;
            let stats = index.stats();
            (stats.files, stats.symbols)
        };
        for (path, message) in errors {
            self.emit(IndexUpdate::Error {
                message,
                path: Some(path),
            });
        }
        self.emit(IndexUpdate::Initial {
            file_count,
            symbol_count,
            from_cache: false,
            duration: start.elapsed(),
        });
        self.mark_dirty();
        Ok(())
    }

    /// Saves the current index immediately, bypassing the debounce window.
    pub async fn persist(&self) -> Result<()> {
        let snapshot = self.inner.index.read().await.clone();
        let dir = self.inner.persist_dir.clone();
        let options = self.inner.options.clone();
        tokio::task::spawn_blocking(move || persist_locked(&snapshot, &dir, &options))
            .await
            .map_err(|e| SymdexError::Internal(e.to_string()))?
    }

    fn mark_dirty(&self) {
        self.inner.dirty.store(true, Ordering::SeqCst);
        if self.inner.persist_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(inner.options.persist_debounce).await;
            inner.persist_scheduled.store(false, Ordering::SeqCst);
            if inner.disposed.load(Ordering::SeqCst) {
                return;
            }
            if !inner.dirty.swap(false, Ordering::SeqCst) {
                return;
            }
            let snapshot = inner.index.read().await.clone();
            let dir = inner.persist_dir.clone();
            let options = inner.options.clone();
            let saved =
                tokio::task::spawn_blocking(move || persist_locked(&snapshot, &dir, &options))
                    .await;
            match saved {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    // Stay dirty so the next debounce retries the save.
                    inner.dirty.store(true, Ordering::SeqCst);
                    let _ = inner.events.send(IndexUpdate::Error {
                        message: e.to_string(),
                        path: None,
                    });
                }
                Err(e) => {
                    inner.dirty.store(true, Ordering::SeqCst);
                    tracing::warn!("persist task failed: {}", e);
                }
            }
        });
    }

    fn emit(&self, update: IndexUpdate) {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.events.send(update);
    }

    /// Idempotent; stops event emission and releases the adapter.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.adapter.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }
}

/// Relative path key used for documents, normalized to forward slashes.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    path.strip_prefix(root)
        .ok()
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
}

fn build_full_index(
    package_root: &Path,
    adapter: &dyn AnalyzerAdapter,
) -> (SymbolIndex, Vec<(PathBuf, String)>) {
    let files = adapter.list_source_files();
    let resolved: Vec<(PathBuf, Result<Option<DocumentRecord>>)> = files
        .par_iter()
        .map(|path| (path.clone(), adapter.resolve_unit(path)))
        .collect();

    let mut index = SymbolIndex::new(package_root.to_path_buf(), None);
    let mut errors = Vec::new();
    for (path, outcome) in resolved {
        let Some(relative) = relative_key(package_root, &path) else {
            continue;
        };
        match outcome {
            Ok(Some(record)) => {
                if let Err(e) = index.update_document(&relative, record) {
                    errors.push((path, e.to_string()));
                }
            }
            Ok(None) => {}
            Err(e) => errors.push((path, e.to_string())),
        }
    }
    (index, errors)
}

fn persist_locked(index: &SymbolIndex, dir: &Path, options: &IndexerOptions) -> Result<()> {
    let _lock = DirLock::acquire(dir).map_err(|e| SymdexError::Persistence(e.to_string()))?;
    persist::save(
        index,
        dir,
        &options.manifest_kind,
        &options.package_name,
        options.package_version.as_deref(),
    )
}

/// Loads the cached artifact if it is still valid: the manifest must be newer
/// than every source file's mtime, and the recorded file set must equal the
/// adapter's current enumeration. Any mismatch or load failure is a cache
/// miss, never an error.
fn load_valid_cache(
    dir: &Path,
    package_root: &Path,
    adapter: &dyn AnalyzerAdapter,
) -> Option<SymbolIndex> {
    let manifest = persist::read_manifest(dir).ok()?;
    let index = match persist::load(dir, package_root, None) {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!("cached index at {} unreadable: {}", dir.display(), e);
            return None;
        }
    };

    let files = adapter.list_source_files();
    let current: BTreeSet<String> = files
        .iter()
        .filter_map(|path| relative_key(package_root, path))
        .collect();
    let recorded: BTreeSet<String> = index.files().into_iter().map(str::to_string).collect();
    if current != recorded {
        tracing::debug!("cache stale for {}: file set changed", package_root.display());
        return None;
    }

    for path in &files {
        if file_mtime(path).map_or(true, |mtime| mtime > manifest.indexed_at) {
            tracing::debug!("cache stale for {}: {} modified", package_root.display(), path.display());
            return None;
        }
    }
    Some(index)
}

fn file_mtime(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}
