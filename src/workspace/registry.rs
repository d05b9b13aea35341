//! One incremental indexer per workspace package, with artifacts mirrored
//! into a central per-workspace cache directory so sibling packages can load
//! each other's indexes by name.

use super::{DiscoveredPackage, Workspace, WorkspaceKind};
use crate::analyzer::AnalyzerFactory;
use crate::error::{Result, SymdexError};
use crate::index::persist::{self, IndexManifest, ARTIFACT_FILE, MANIFEST_FILE};
use crate::indexer::{IncrementalIndexer, IndexerOptions};
use crate::registry::cache::{local_package_dir, workspace_cache_dir, CacheLayout, DirLock};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const WORKSPACE_MANIFEST_FILE: &str = "workspace.json";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceManifest {
    #[serde(rename = "type")]
    pub kind: WorkspaceKind,
    pub root_path: PathBuf,
    pub packages: Vec<WorkspacePackageEntry>,
    pub updated_at: chrono::DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WorkspacePackageEntry {
    pub name: String,
    pub relative_path: String,
}

pub struct WorkspaceRegistry {
    workspace: Workspace,
    cache_dir: PathBuf,
    indexers: Vec<(DiscoveredPackage, IncrementalIndexer)>,
}

impl WorkspaceRegistry {
    /// Opens one indexer per workspace package and mirrors every freshly
    /// persisted artifact into `<root>/.symdex/local/<name>/`.
    pub async fn open(
        workspace: Workspace,
        factory: &dyn AnalyzerFactory,
        use_cache: bool,
        cache: &CacheLayout,
    ) -> Result<Self> {
        let cache_dir = workspace_cache_dir(&workspace.root);
        let mut indexers = Vec::new();

        for package in workspace.packages.clone() {
            let adapter = factory.create(&package.path)?;
            let mut options = IndexerOptions::for_package(package.name.clone());
            options.use_cache = use_cache;
            options.persist_dir = Some(cache.project_dir(&package.path));
            options.package_version = package.version.clone();
            let indexer =
                IncrementalIndexer::open(package.path.clone(), adapter, options).await?;
            mirror_package(&cache_dir, &package, &indexer).await?;
            indexers.push((package, indexer));
        }

        let registry = Self {
            workspace,
            cache_dir,
            indexers,
        };
        registry.write_workspace_manifest()?;
        Ok(registry)
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn indexers(&self) -> impl Iterator<Item = &(DiscoveredPackage, IncrementalIndexer)> {
        self.indexers.iter()
    }

    pub fn indexer_for(&self, name: &str) -> Option<&IncrementalIndexer> {
        self.indexers
            .iter()
            .find(|(package, _)| package.name == name)
            .map(|(_, indexer)| indexer)
    }

    pub fn indexer_for_path(&self, path: &Path) -> Option<(&DiscoveredPackage, &IncrementalIndexer)> {
        let owner = self.workspace.find_package_for_path(path)?;
        self.indexers
            .iter()
            .find(|(package, _)| package.path == owner.path)
            .map(|(package, indexer)| (package, indexer))
    }

    /// Routes a changed file to its owning package's indexer and re-mirrors
    /// that package's artifact. Paths owned by no package are ignored.
    pub async fn update_file(&self, path: &Path) -> Result<Option<String>> {
        let Some((package, indexer)) = self.indexer_for_path(path) else {
            return Ok(None);
        };
        indexer.refresh_file(path).await?;
        mirror_package(&self.cache_dir, package, indexer).await?;
        self.write_workspace_manifest()?;
        Ok(Some(package.name.clone()))
    }

    pub async fn refresh_all(&self) -> Result<()> {
        for (package, indexer) in &self.indexers {
            indexer.refresh_all().await?;
            mirror_package(&self.cache_dir, package, indexer).await?;
        }
        self.write_workspace_manifest()?;
        Ok(())
    }

    fn write_workspace_manifest(&self) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let manifest = WorkspaceManifest {
            kind: self.workspace.kind,
            root_path: self.workspace.root.clone(),
            packages: self
                .workspace
                .packages
                .iter()
                .map(|package| WorkspacePackageEntry {
                    name: package.name.clone(),
                    relative_path: package.relative_path.clone(),
                })
                .collect(),
            updated_at: Utc::now(),
        };
        let path = self.cache_dir.join(WORKSPACE_MANIFEST_FILE);
        std::fs::write(path, serde_json::to_vec_pretty(&manifest)?)?;
        Ok(())
    }

    pub fn dispose(&self) {
        for (_, indexer) in &self.indexers {
            indexer.dispose();
        }
    }
}

/// Copies a package's persisted artifact into the workspace-local mirror and
/// writes a `local`-typed manifest beside it.
async fn mirror_package(
    cache_dir: &Path,
    package: &DiscoveredPackage,
    indexer: &IncrementalIndexer,
) -> Result<()> {
    indexer.persist().await?;

    let target = local_package_dir(cache_dir, &package.name);
    let source_artifact = indexer.persist_dir().join(ARTIFACT_FILE);
    let package = package.clone();
    let target_for_copy = target.clone();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let _lock = DirLock::acquire(&target_for_copy)
            .map_err(|e| SymdexError::Persistence(e.to_string()))?;
        std::fs::copy(&source_artifact, target_for_copy.join(ARTIFACT_FILE))?;
        let manifest = IndexManifest {
            kind: "local".to_string(),
            name: package.name.clone(),
            version: package.version.clone(),
            source_path: package.path.clone(),
            indexed_at: Utc::now(),
        };
        std::fs::write(
            target_for_copy.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&manifest)?,
        )?;
        Ok(())
    })
    .await
    .map_err(|e| SymdexError::Internal(e.to_string()))??;

    debug_assert!(persist::artifact_exists(&target));
    Ok(())
}
