//! Capability contract between the core and a language-specific analyzer.
//!
//! The core never inspects source text itself (grep aside); everything it
//! knows about a file arrives as a `DocumentRecord` from an adapter. New
//! languages plug in by implementing `AnalyzerAdapter` and describing their
//! file conventions in a `LanguageBinding`.

use crate::error::Result;
use crate::model::DocumentRecord;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// File conventions of the indexed language: what counts as source, what is
/// generated, and which well-known files drive workspace/dependency layout.
#[derive(Debug, Clone)]
pub struct LanguageBinding {
    pub language: String,
    pub source_extensions: Vec<String>,
    /// Directory names skipped everywhere (build output, tool caches).
    pub ignored_dirs: Vec<String>,
    /// File-name suffixes of generated sources, e.g. `.g.ax`.
    pub generated_suffixes: Vec<String>,
    pub package_manifest: String,
    pub workspace_config: String,
    pub lockfile: String,
}

impl Default for LanguageBinding {
    fn default() -> Self {
        Self {
            language: "ax".to_string(),
            source_extensions: vec!["ax".to_string()],
            ignored_dirs: vec![
                "build".to_string(),
                "out".to_string(),
                ".symdex".to_string(),
            ],
            generated_suffixes: vec![".g.ax".to_string()],
            package_manifest: "module.json".to_string(),
            workspace_config: "workspace.config.json".to_string(),
            lockfile: "packages.lock.json".to_string(),
        }
    }
}

impl LanguageBinding {
    pub fn is_source_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.source_extensions.iter().any(|known| known == ext))
    }

    /// True when any path component is hidden or a known ignored directory.
    pub fn in_ignored_dir(&self, path: &Path) -> bool {
        path.components().any(|component| {
            let name = component.as_os_str().to_string_lossy();
            (name.starts_with('.') && name.len() > 1 && name != "..")
                || self.ignored_dirs.iter().any(|dir| dir.as_str() == name)
        })
    }

    pub fn is_generated(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.generated_suffixes
            .iter()
            .any(|suffix| name.ends_with(suffix.as_str()))
    }

    /// The refresh gate: extension matches, not generated, not in an ignored
    /// directory.
    pub fn is_indexable(&self, path: &Path) -> bool {
        self.is_source_extension(path) && !self.is_generated(path) && !self.in_ignored_dir(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Moved { from: PathBuf, to: PathBuf },
}

/// What the core requires from any language analyzer.
///
/// Calls may block on I/O or analysis; the indexer wraps them in blocking
/// tasks and serializes refreshes itself, so implementations need no
/// internal scheduling discipline beyond being `Send + Sync`.
pub trait AnalyzerAdapter: Send + Sync {
    fn binding(&self) -> &LanguageBinding;

    /// Resolved facts for one file, or `None` when the file does not belong
    /// to the package, is not analyzable, or is ignored.
    fn resolve_unit(&self, path: &Path) -> Result<Option<DocumentRecord>>;

    /// All files the adapter considers indexable, in unspecified order.
    fn list_source_files(&self) -> Vec<PathBuf>;

    /// Change stream for analyzers that watch on their own. Single-consumer:
    /// the first taker drains it, later calls return `None`.
    fn take_file_changes(&self) -> Option<mpsc::UnboundedReceiver<FileChange>> {
        None
    }

    fn dispose(&self) {}
}

/// Pairs a binding with adapter construction so the workspace layer can open
/// one adapter per package.
pub trait AnalyzerFactory: Send + Sync {
    fn binding(&self) -> &LanguageBinding;

    fn create(&self, package_root: &Path) -> Result<Arc<dyn AnalyzerAdapter>>;
}

/// Registered analyzer factories, consulted to decide which language owns a
/// project. An explicit value held by the host (the CLI builds one at
/// startup, embedders build their own), never a process-wide singleton.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: Vec<Arc<dyn AnalyzerFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn AnalyzerFactory>) {
        self.factories.push(factory);
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// First registered factory whose binding recognizes the project: its
    /// package manifest or workspace config sits in the directory or one of
    /// its ancestors.
    pub fn find_for(&self, project_path: &Path) -> Option<Arc<dyn AnalyzerFactory>> {
        self.factories
            .iter()
            .find(|factory| {
                let binding = factory.binding();
                project_path.ancestors().any(|dir| {
                    dir.join(&binding.package_manifest).is_file()
                        || dir.join(&binding.workspace_config).is_file()
                })
            })
            .cloned()
    }
}
