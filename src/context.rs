//! The embedder surface: open a project, query it, observe updates.
//!
//! `Context::open` detects the workspace, opens one incremental indexer per
//! package, wires the federation registry (active package first, siblings as
//! locals), optionally loads dependency indexes, and optionally starts the
//! unified watcher.

use crate::analyzer::{AnalyzerFactory, LanguageBinding};
use crate::error::{Result, SymdexError};
use crate::indexer::IndexUpdate;
use crate::query::{QueryExecutor, QueryResult};
use crate::registry::cache::CacheLayout;
use crate::registry::deps::{added_dependencies, DependencyLoadResult, DependencySource, Lockfile};
use crate::registry::IndexRegistry;
use crate::workspace::registry::WorkspaceRegistry;
use crate::workspace::watcher::{RootWatcher, WatchEvent, DEFAULT_WATCH_DEBOUNCE};
use crate::workspace::{Workspace, WorkspaceKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};

#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub watch: bool,
    pub use_cache: bool,
    pub load_dependencies: bool,
    /// Cache override for tests and sandboxed embedders.
    pub cache: Option<CacheLayout>,
    pub watch_debounce: Duration,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            watch: false,
            use_cache: true,
            load_dependencies: false,
            cache: None,
            watch_debounce: DEFAULT_WATCH_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ContextUpdate {
    Index { package: String, update: IndexUpdate },
    /// A package manifest changed. No automatic re-discovery happens; reopen
    /// the context to pick up structural changes.
    StructuralChange { path: PathBuf },
}

pub struct Context {
    workspace: Workspace,
    packages: Arc<WorkspaceRegistry>,
    registry: Arc<RwLock<IndexRegistry>>,
    updates: broadcast::Sender<ContextUpdate>,
    watcher: std::sync::Mutex<Option<RootWatcher>>,
    forwarders: Vec<tokio::task::JoinHandle<()>>,
    active_package: String,
    lockfile_path: PathBuf,
    lockfile_snapshot: Arc<Mutex<Lockfile>>,
    disposed: Arc<AtomicBool>,
}

impl Context {
    pub async fn open(
        project_path: &Path,
        factory: Arc<dyn AnalyzerFactory>,
        options: OpenOptions,
    ) -> Result<Self> {
        let binding = factory.binding().clone();
        let workspace = Workspace::detect(project_path, &binding)?
            .unwrap_or_else(|| single_package_fallback(project_path));
        tracing::info!(
            "opening {:?} workspace at {} ({} package(s))",
            workspace.kind,
            workspace.root.display(),
            workspace.packages.len()
        );

        let cache = options.cache.clone().unwrap_or_else(CacheLayout::from_env);
        let packages = Arc::new(
            WorkspaceRegistry::open(
                workspace.clone(),
                factory.as_ref(),
                options.use_cache,
                &cache,
            )
            .await?,
        );

        let active = workspace
            .find_package_for_path(project_path)
            .or_else(|| workspace.packages.first())
            .ok_or_else(|| SymdexError::Internal("workspace has no packages".to_string()))?
            .clone();
        let active_indexer = packages
            .indexer_for(&active.name)
            .ok_or_else(|| SymdexError::Internal("active package has no indexer".to_string()))?;
        let mut registry = IndexRegistry::new(&active.name, active_indexer.index(), cache);
        registry.set_workspace_cache(packages.cache_dir().to_path_buf());
        for package in &workspace.packages {
            if package.name != active.name {
                registry.load_local_package(&package.name)?;
            }
        }

        let lockfile_path = active.path.join(&binding.lockfile);
        let mut lockfile_snapshot = Lockfile::default();
        if options.load_dependencies && lockfile_path.is_file() {
            let lockfile = Lockfile::parse(&lockfile_path)?;
            let result = registry.load_dependencies(&lockfile);
            log_dependency_result(&result);
            lockfile_snapshot = lockfile;
        }

        let registry = Arc::new(RwLock::new(registry));
        let (updates, _) = broadcast::channel(512);
        let disposed = Arc::new(AtomicBool::new(false));

        // Fan every indexer's event stream into the context-level stream.
        let mut forwarders = Vec::new();
        for (package, indexer) in packages.indexers() {
            let mut receiver = indexer.subscribe();
            let sender = updates.clone();
            let name = package.name.clone();
            let disposed_flag = Arc::clone(&disposed);
            forwarders.push(tokio::spawn(async move {
                loop {
                    match receiver.recv().await {
                        Ok(update) => {
                            if disposed_flag.load(Ordering::SeqCst) {
                                return;
                            }
                            let _ = sender.send(ContextUpdate::Index {
                                package: name.clone(),
                                update,
                            });
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!("update stream lagged, dropped {} events", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }));
        }

        let context = Self {
            workspace,
            packages,
            registry,
            updates,
            watcher: std::sync::Mutex::new(None),
            forwarders,
            active_package: active.name.clone(),
            lockfile_path,
            lockfile_snapshot: Arc::new(Mutex::new(lockfile_snapshot)),
            disposed,
        };

        if options.watch {
            context.start_watcher(binding, options.watch_debounce)?;
        }
        Ok(context)
    }

    fn start_watcher(&self, binding: LanguageBinding, debounce: Duration) -> Result<()> {
        let (watcher, mut events) =
            RootWatcher::spawn(&self.workspace.root, binding, debounce)?;

        let packages = Arc::clone(&self.packages);
        let registry = Arc::clone(&self.registry);
        let snapshot = Arc::clone(&self.lockfile_snapshot);
        let updates = self.updates.clone();
        let disposed = Arc::clone(&self.disposed);

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if disposed.load(Ordering::SeqCst) {
                    return;
                }
                match event {
                    WatchEvent::Source(path) => {
                        if let Err(e) = packages.update_file(&path).await {
                            tracing::warn!("refresh of {} failed: {}", path.display(), e);
                        }
                    }
                    WatchEvent::Lockfile(path) => {
                        reload_dependencies(&registry, &snapshot, &path).await;
                    }
                    WatchEvent::Manifest(path) => {
                        let _ = updates.send(ContextUpdate::StructuralChange { path });
                    }
                }
            }
        });

        *self.watcher.lock().expect("watcher mutex poisoned") = Some(watcher);
        Ok(())
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn active_package(&self) -> &str {
        &self.active_package
    }

    pub fn updates(&self) -> broadcast::Receiver<ContextUpdate> {
        self.updates.subscribe()
    }

    pub async fn query(&self, text: &str) -> Result<QueryResult> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(SymdexError::IndexerDisposed);
        }
        let registry = self.registry.read().await;
        Ok(QueryExecutor::new(&registry).execute(text).await)
    }

    pub async fn refresh_file(&self, path: &Path) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(SymdexError::IndexerDisposed);
        }
        self.packages.update_file(path).await?;
        Ok(())
    }

    pub async fn refresh_all(&self) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(SymdexError::IndexerDisposed);
        }
        self.packages.refresh_all().await
    }

    /// Lazy dependency enablement for contexts opened without
    /// `load_dependencies`.
    pub async fn load_dependencies(&self) -> Result<DependencyLoadResult> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(SymdexError::IndexerDisposed);
        }
        if !self.lockfile_path.is_file() {
            return Ok(DependencyLoadResult::default());
        }
        let lockfile = Lockfile::parse(&self.lockfile_path)?;
        let result = {
            let mut registry = self.registry.write().await;
            registry.load_dependencies(&lockfile)
        };
        *self.lockfile_snapshot.lock().await = lockfile;
        log_dependency_result(&result);
        Ok(result)
    }

    /// Idempotent: stops the watcher, severs event forwarding, and disposes
    /// every package indexer.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut guard) = self.watcher.lock() {
            if let Some(watcher) = guard.take() {
                watcher.stop();
            }
        }
        for task in &self.forwarders {
            task.abort();
        }
        self.packages.dispose();
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn single_package_fallback(project_path: &Path) -> Workspace {
    let name = project_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string());
    Workspace {
        kind: WorkspaceKind::Single,
        root: project_path.to_path_buf(),
        packages: vec![crate::workspace::DiscoveredPackage {
            name,
            path: project_path.to_path_buf(),
            version: None,
            relative_path: String::new(),
        }],
    }
}

/// Diffs the changed lockfile against the previous snapshot and loads only
/// newly-added dependencies. Removed ones stay loaded: unloading on removal
/// would churn on every lockfile rewrite for little memory back.
async fn reload_dependencies(
    registry: &Arc<RwLock<IndexRegistry>>,
    snapshot: &Arc<Mutex<Lockfile>>,
    path: &Path,
) {
    let new_lockfile = match Lockfile::parse(path) {
        Ok(lockfile) => lockfile,
        Err(e) => {
            tracing::warn!("unreadable lockfile {}: {}", path.display(), e);
            return;
        }
    };
    let mut snapshot = snapshot.lock().await;
    let added = added_dependencies(&snapshot, &new_lockfile);
    if !added.is_empty() {
        let mut registry = registry.write().await;
        for dep in added {
            let outcome = match dep.source {
                DependencySource::Sdk => {
                    let version = dep.version.as_deref().unwrap_or("unknown");
                    registry.load_framework_package(version, &dep.name)
                }
                DependencySource::Hosted => {
                    let version = dep.version.as_deref().unwrap_or("unknown");
                    registry.load_package(&dep.name, version)
                }
                DependencySource::Git => registry.load_git_package(&dep.cache_key),
                DependencySource::Path => registry.load_local_package(&dep.name),
            };
            match outcome {
                Ok(true) => tracing::info!("loaded new dependency {}", dep.name),
                Ok(false) => tracing::debug!("no cached index for new dependency {}", dep.name),
                Err(e) => tracing::warn!("loading {} failed: {}", dep.name, e),
            }
        }
    }
    *snapshot = new_lockfile;
}

fn log_dependency_result(result: &DependencyLoadResult) {
    tracing::info!(
        "dependencies: sdk={} framework={}/{} hosted={}/{} git={}/{} local={}/{}",
        result.sdk_loaded,
        result.framework_loaded.len(),
        result.framework_loaded.len() + result.framework_missing.len(),
        result.hosted_loaded.len(),
        result.hosted_loaded.len() + result.hosted_missing.len(),
        result.git_loaded.len(),
        result.git_loaded.len() + result.git_missing.len(),
        result.local_loaded.len(),
        result.local_loaded.len() + result.local_missing.len(),
    );
}
