//! Multi-index federation.
//!
//! One registry composes the live project index with externally loaded
//! indexes under a fixed precedence order: project, then workspace-local
//! siblings, SDK, framework, hosted, git. Exact-key lookups return the first
//! hit; list queries concatenate and de-duplicate by SymbolId so provenance
//! stays deterministic; members are closed within their defining index.

pub mod cache;
pub mod deps;

use crate::error::Result;
use crate::index::persist;
use crate::index::{GrepMatch, GrepOptions, IndexStats, SymbolIndex};
use crate::indexer::SharedIndex;
use crate::model::{OccurrenceInfo, SymbolId, SymbolInfo};
use cache::{local_package_dir, CacheLayout};
use deps::{DependencyLoadResult, DependencySource, Lockfile};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Local,
    Sdk,
    Framework,
    Hosted,
    Git,
}

/// A loaded external index tagged with where it came from.
pub struct ExternalSlot {
    pub provenance: Provenance,
    pub cache_key: String,
    pub name: String,
    pub index: SymbolIndex,
}

/// A symbol annotated with the package whose index answered for it.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SymbolHit {
    pub package: String,
    pub info: SymbolInfo,
}

/// An occurrence annotated with its package and that package's source root,
/// so callers can map it back to an absolute path.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedOccurrence {
    pub package: String,
    pub source_root: PathBuf,
    pub occurrence: OccurrenceInfo,
}

/// Per-package slice of a cross-package reference search.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PackageReferences {
    pub package: String,
    pub source_root: PathBuf,
    pub references: Vec<OccurrenceInfo>,
}

#[derive(Serialize, Debug, Clone)]
pub struct PackageGrep {
    pub package: String,
    pub matches: Vec<GrepMatch>,
}

pub struct IndexRegistry {
    project_name: String,
    /// Borrowed from the owning indexer; never mutated here.
    project: SharedIndex,
    externals: Vec<ExternalSlot>,
    cache: CacheLayout,
    /// Where workspace sibling artifacts are mirrored, when inside one.
    workspace_cache: Option<PathBuf>,
}

impl IndexRegistry {
    pub fn new(project_name: impl Into<String>, project: SharedIndex, cache: CacheLayout) -> Self {
        Self {
            project_name: project_name.into(),
            project,
            externals: Vec::new(),
            cache,
            workspace_cache: None,
        }
    }

    pub fn set_workspace_cache(&mut self, dir: PathBuf) {
        self.workspace_cache = Some(dir);
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn external_count(&self) -> usize {
        self.externals.len()
    }

    pub fn loaded(&self) -> impl Iterator<Item = (&Provenance, &str, &str)> {
        self.externals
            .iter()
            .map(|slot| (&slot.provenance, slot.cache_key.as_str(), slot.name.as_str()))
    }

    // ---- Federated reads ----

    /// Exact-key lookup: first index in precedence order wins.
    pub async fn get_symbol(&self, id: &SymbolId) -> Option<SymbolHit> {
        {
            let project = self.project.read().await;
            if let Some(info) = project.get_symbol(id) {
                return Some(SymbolHit {
                    package: self.project_name.clone(),
                    info: info.clone(),
                });
            }
        }
        self.externals.iter().find_map(|slot| {
            slot.index.get_symbol(id).map(|info| SymbolHit {
                package: slot.name.clone(),
                info: info.clone(),
            })
        })
    }

    /// Exact-key lookup: first definition in precedence order wins.
    pub async fn find_definition(&self, id: &SymbolId) -> Option<AnnotatedOccurrence> {
        {
            let project = self.project.read().await;
            if let Some(occ) = project.find_definition(id) {
                return Some(AnnotatedOccurrence {
                    package: self.project_name.clone(),
                    source_root: project.source_root().to_path_buf(),
                    occurrence: occ.clone(),
                });
            }
        }
        self.externals.iter().find_map(|slot| {
            slot.index.find_definition(id).map(|occ| AnnotatedOccurrence {
                package: slot.name.clone(),
                source_root: slot.index.source_root().to_path_buf(),
                occurrence: occ.clone(),
            })
        })
    }

    /// All occurrences of `id` across every index. A reference to a foreign
    /// symbol lives in the referencing package's index, so this concatenates
    /// rather than stopping at the first hit.
    pub async fn find_references(&self, id: &SymbolId) -> Vec<AnnotatedOccurrence> {
        let mut out = Vec::new();
        {
            let project = self.project.read().await;
            for occ in project.find_references(id) {
                out.push(AnnotatedOccurrence {
                    package: self.project_name.clone(),
                    source_root: project.source_root().to_path_buf(),
                    occurrence: occ,
                });
            }
        }
        for slot in &self.externals {
            for occ in slot.index.find_references(id) {
                out.push(AnnotatedOccurrence {
                    package: slot.name.clone(),
                    source_root: slot.index.source_root().to_path_buf(),
                    occurrence: occ,
                });
            }
        }
        out
    }

    pub async fn find_symbols(&self, pattern: &str) -> Vec<SymbolHit> {
        let mut hits = Vec::new();
        {
            let project = self.project.read().await;
            for info in project.find_symbols(pattern) {
                hits.push(SymbolHit {
                    package: self.project_name.clone(),
                    info,
                });
            }
        }
        for slot in &self.externals {
            for info in slot.index.find_symbols(pattern) {
                hits.push(SymbolHit {
                    package: slot.name.clone(),
                    info,
                });
            }
        }
        dedup_by_symbol(hits)
    }

    pub async fn find_qualified(&self, container: &str, member: &str) -> Vec<SymbolHit> {
        let mut hits = Vec::new();
        {
            let project = self.project.read().await;
            for info in project.find_qualified(container, member) {
                hits.push(SymbolHit {
                    package: self.project_name.clone(),
                    info,
                });
            }
        }
        for slot in &self.externals {
            for info in slot.index.find_qualified(container, member) {
                hits.push(SymbolHit {
                    package: slot.name.clone(),
                    info,
                });
            }
        }
        dedup_by_symbol(hits)
    }

    /// Members are closed within their defining index: the first index that
    /// yields a non-empty list wins, nothing is merged across indexes.
    pub async fn members_of(&self, id: &SymbolId) -> Vec<SymbolHit> {
        {
            let project = self.project.read().await;
            let members = project.members_of(id);
            if !members.is_empty() {
                return members
                    .into_iter()
                    .map(|info| SymbolHit {
                        package: self.project_name.clone(),
                        info,
                    })
                    .collect();
            }
        }
        for slot in &self.externals {
            let members = slot.index.members_of(id);
            if !members.is_empty() {
                return members
                    .into_iter()
                    .map(|info| SymbolHit {
                        package: slot.name.clone(),
                        info,
                    })
                    .collect();
            }
        }
        Vec::new()
    }

    pub async fn supertypes_of(&self, id: &SymbolId) -> Vec<SymbolHit> {
        let ids = self.collect_ids(|index| index.supertype_ids(id)).await;
        self.resolve_hits(ids).await
    }

    pub async fn subtypes_of(&self, id: &SymbolId) -> Vec<SymbolHit> {
        let ids = self.collect_ids(|index| index.subtype_ids(id)).await;
        self.resolve_hits(ids).await
    }

    pub async fn implementations_of(&self, id: &SymbolId) -> Vec<SymbolHit> {
        let ids = self.collect_ids(|index| index.implementation_ids(id)).await;
        self.resolve_hits(ids).await
    }

    pub async fn get_calls(&self, id: &SymbolId) -> Vec<SymbolHit> {
        let ids = self.collect_ids(|index| index.call_target_ids(id)).await;
        self.resolve_hits(ids).await
    }

    pub async fn get_callers(&self, id: &SymbolId) -> Vec<SymbolHit> {
        let ids = self.collect_ids(|index| index.caller_ids(id)).await;
        self.resolve_hits(ids).await
    }

    /// Cross-package reference search keyed by display name, for when the
    /// same conceptual symbol carries a different SymbolId per index. Every
    /// index is searched and nothing is de-duplicated.
    pub async fn find_all_references_by_name(&self, name: &str) -> Vec<PackageReferences> {
        let mut out = Vec::new();
        {
            let project = self.project.read().await;
            if let Some(refs) = references_by_name(&project, name) {
                out.push(PackageReferences {
                    package: self.project_name.clone(),
                    source_root: project.source_root().to_path_buf(),
                    references: refs,
                });
            }
        }
        for slot in &self.externals {
            if let Some(refs) = references_by_name(&slot.index, name) {
                out.push(PackageReferences {
                    package: slot.name.clone(),
                    source_root: slot.index.source_root().to_path_buf(),
                    references: refs,
                });
            }
        }
        out
    }

    /// Scans project and workspace-local sources always; SDK/framework/
    /// hosted/git sources only with `include_external`. Two indexes over the
    /// same tree are scanned once.
    pub async fn grep(
        &self,
        pattern: &str,
        options: &GrepOptions,
        include_external: bool,
    ) -> Result<Vec<PackageGrep>> {
        let mut scanned: HashSet<PathBuf> = HashSet::new();
        let mut out = Vec::new();
        {
            let project = self.project.read().await;
            scanned.insert(project.source_root().to_path_buf());
            let matches = project.grep(pattern, options)?;
            if !matches.is_empty() {
                out.push(PackageGrep {
                    package: self.project_name.clone(),
                    matches,
                });
            }
        }
        for slot in &self.externals {
            if slot.provenance != Provenance::Local && !include_external {
                continue;
            }
            if !scanned.insert(slot.index.source_root().to_path_buf()) {
                continue;
            }
            let matches = slot.index.grep(pattern, options)?;
            if !matches.is_empty() {
                out.push(PackageGrep {
                    package: slot.name.clone(),
                    matches,
                });
            }
        }
        Ok(out)
    }

    /// Maps a symbol back to an absolute file path by joining the owning
    /// index's source root with the definition's relative path.
    pub async fn resolve_file_path(&self, id: &SymbolId) -> Option<PathBuf> {
        {
            let project = self.project.read().await;
            if project.defines(id) {
                let def = project.find_definition(id)?;
                return Some(project.source_root().join(&def.file));
            }
        }
        for slot in &self.externals {
            if slot.index.defines(id) {
                let def = slot.index.find_definition(id)?;
                return Some(slot.index.source_root().join(&def.file));
            }
        }
        None
    }

    pub async fn project_files(&self) -> Vec<String> {
        self.project
            .read()
            .await
            .files()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub async fn stats(&self) -> Vec<(String, IndexStats)> {
        let mut out = vec![(
            self.project_name.clone(),
            self.project.read().await.stats(),
        )];
        for slot in &self.externals {
            out.push((slot.name.clone(), slot.index.stats()));
        }
        out
    }

    async fn collect_ids<F>(&self, f: F) -> Vec<SymbolId>
    where
        F: Fn(&SymbolIndex) -> Vec<SymbolId>,
    {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        {
            let project = self.project.read().await;
            for id in f(&project) {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }
        for slot in &self.externals {
            for id in f(&slot.index) {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    async fn resolve_hits(&self, ids: Vec<SymbolId>) -> Vec<SymbolHit> {
        let mut hits = Vec::new();
        for id in ids {
            if let Some(hit) = self.get_symbol(&id).await {
                hits.push(hit);
            }
        }
        hits
    }

    // ---- External index loading ----

    pub fn has_sdk_index(&self, version: &str) -> bool {
        persist::artifact_exists(&self.cache.sdk_dir(version))
    }

    pub fn load_sdk(&mut self, version: &str) -> Result<bool> {
        self.load_slot(
            Provenance::Sdk,
            version.to_string(),
            "sdk".to_string(),
            self.cache.sdk_dir(version),
        )
    }

    pub fn unload_sdk(&mut self, version: &str) {
        self.unload(Provenance::Sdk, version);
    }

    pub fn has_framework_index(&self, version: &str, name: &str) -> bool {
        persist::artifact_exists(&self.cache.framework_dir(version, name))
    }

    pub fn load_framework_package(&mut self, version: &str, name: &str) -> Result<bool> {
        self.load_slot(
            Provenance::Framework,
            format!("{}-{}", name, version),
            name.to_string(),
            self.cache.framework_dir(version, name),
        )
    }

    pub fn has_package_index(&self, name: &str, version: &str) -> bool {
        persist::artifact_exists(&self.cache.hosted_dir(name, version))
    }

    pub fn load_package(&mut self, name: &str, version: &str) -> Result<bool> {
        self.load_slot(
            Provenance::Hosted,
            format!("{}-{}", name, version),
            name.to_string(),
            self.cache.hosted_dir(name, version),
        )
    }

    pub fn has_git_index(&self, key: &str) -> bool {
        persist::artifact_exists(&self.cache.git_dir(key))
    }

    pub fn load_git_package(&mut self, key: &str) -> Result<bool> {
        self.load_slot(
            Provenance::Git,
            key.to_string(),
            key.to_string(),
            self.cache.git_dir(key),
        )
    }

    pub fn has_local_index(&self, name: &str) -> bool {
        self.workspace_cache
            .as_deref()
            .map(|dir| persist::artifact_exists(&local_package_dir(dir, name)))
            .unwrap_or(false)
    }

    pub fn load_local_package(&mut self, name: &str) -> Result<bool> {
        let Some(dir) = self.workspace_cache.clone() else {
            return Ok(false);
        };
        self.load_slot(
            Provenance::Local,
            name.to_string(),
            name.to_string(),
            local_package_dir(&dir, name),
        )
    }

    pub fn unload(&mut self, provenance: Provenance, cache_key: &str) {
        self.externals
            .retain(|slot| !(slot.provenance == provenance && slot.cache_key == cache_key));
    }

    fn load_slot(
        &mut self,
        provenance: Provenance,
        cache_key: String,
        name: String,
        dir: PathBuf,
    ) -> Result<bool> {
        if !persist::artifact_exists(&dir) {
            return Ok(false);
        }
        let already = self
            .externals
            .iter()
            .any(|slot| slot.provenance == provenance && slot.cache_key == cache_key);
        if already {
            return Ok(true);
        }
        let index = persist::load(&dir, &dir, None)?;
        tracing::debug!(
            "loaded {:?} index {} from {}",
            provenance,
            name,
            dir.display()
        );
        self.externals.push(ExternalSlot {
            provenance,
            cache_key,
            name,
            index,
        });
        // Stable sort: precedence order first, insertion order within.
        self.externals.sort_by_key(|slot| slot.provenance);
        Ok(true)
    }

    /// Loads every dependency named by the project's lockfile from its
    /// provenance-appropriate cache slot, tracking loaded vs missing.
    /// A failure on one dependency does not stop the others.
    pub fn load_from_lockfile(&mut self, lockfile_path: &Path) -> Result<DependencyLoadResult> {
        let lockfile = Lockfile::parse(lockfile_path)?;
        Ok(self.load_dependencies(&lockfile))
    }

    pub fn load_dependencies(&mut self, lockfile: &Lockfile) -> DependencyLoadResult {
        let mut result = DependencyLoadResult::default();

        if let Some(version) = &lockfile.sdk {
            result.sdk_loaded = self.load_sdk(version).unwrap_or(false);
            result.sdk_version = Some(version.clone());
        }

        for dep in lockfile.resolved() {
            let loaded = match dep.source {
                DependencySource::Sdk => {
                    let version = dep.version.as_deref().unwrap_or("unknown");
                    self.load_framework_package(version, &dep.name)
                }
                DependencySource::Hosted => {
                    let version = dep.version.as_deref().unwrap_or("unknown");
                    self.load_package(&dep.name, version)
                }
                DependencySource::Git => self.load_git_package(&dep.cache_key),
                DependencySource::Path => self.load_local_package(&dep.name),
            };
            let loaded = match loaded {
                Ok(loaded) => loaded,
                Err(e) => {
                    tracing::warn!("failed to load dependency {}: {}", dep.name, e);
                    false
                }
            };
            let (loaded_list, missing_list) = match dep.source {
                DependencySource::Sdk => (&mut result.framework_loaded, &mut result.framework_missing),
                DependencySource::Hosted => (&mut result.hosted_loaded, &mut result.hosted_missing),
                DependencySource::Git => (&mut result.git_loaded, &mut result.git_missing),
                DependencySource::Path => (&mut result.local_loaded, &mut result.local_missing),
            };
            if loaded {
                loaded_list.push(dep.name);
            } else {
                missing_list.push(dep.name);
            }
        }
        result
    }
}

fn dedup_by_symbol(hits: Vec<SymbolHit>) -> Vec<SymbolHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| seen.insert(hit.info.symbol.clone()))
        .collect()
}

fn references_by_name(index: &SymbolIndex, name: &str) -> Option<Vec<OccurrenceInfo>> {
    let mut refs = Vec::new();
    for info in index.find_symbols(name) {
        refs.extend(index.find_references(&info.symbol));
    }
    if refs.is_empty() {
        None
    } else {
        Some(refs)
    }
}
