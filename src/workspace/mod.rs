//! Workspace detection: is a directory a single package, a manifest-declared
//! multi-package workspace, or a tool-driven one?

pub mod registry;
pub mod watcher;

use crate::analyzer::LanguageBinding;
use crate::error::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceKind {
    /// One package manifest, no members declared.
    Single,
    /// The package manifest itself enumerates member paths.
    Manifest,
    /// A separate tool config lists member globs with ignore patterns.
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPackage {
    pub name: String,
    /// Absolute package root.
    pub path: PathBuf,
    pub version: Option<String>,
    pub relative_path: String,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    pub kind: WorkspaceKind,
    pub root: PathBuf,
    /// Sorted by relative path for determinism.
    pub packages: Vec<DiscoveredPackage>,
}

#[derive(Deserialize, Debug)]
struct PackageManifest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    workspace: Option<Vec<String>>,
}

#[derive(Deserialize, Debug)]
struct ToolConfig {
    #[serde(default)]
    #[allow(dead_code)]
    name: Option<String>,
    packages: Vec<String>,
    #[serde(default)]
    ignore: Vec<String>,
}

impl Workspace {
    /// Walks ancestors of `start` looking for a workspace marker. The nearest
    /// tool config or members-declaring manifest wins; failing both, the
    /// nearest plain package manifest yields a single-package workspace.
    pub fn detect(start: &Path, binding: &LanguageBinding) -> Result<Option<Workspace>> {
        let mut single_candidate: Option<PathBuf> = None;

        for dir in start.ancestors() {
            let tool_config = dir.join(&binding.workspace_config);
            if tool_config.is_file() {
                let config: ToolConfig = read_json(&tool_config)?;
                let packages =
                    expand_members(dir, &config.packages, &config.ignore, binding)?;
                return Ok(Some(Workspace {
                    kind: WorkspaceKind::Tool,
                    root: dir.to_path_buf(),
                    packages,
                }));
            }

            let manifest_path = dir.join(&binding.package_manifest);
            if manifest_path.is_file() {
                let manifest: PackageManifest = read_json(&manifest_path)?;
                if let Some(members) = manifest.workspace {
                    let packages = expand_members(dir, &members, &[], binding)?;
                    return Ok(Some(Workspace {
                        kind: WorkspaceKind::Manifest,
                        root: dir.to_path_buf(),
                        packages,
                    }));
                }
                if single_candidate.is_none() {
                    single_candidate = Some(dir.to_path_buf());
                }
            }
        }

        match single_candidate {
            Some(root) => {
                let package = package_at(&root, &root, binding)
                    .unwrap_or_else(|| fallback_package(&root, &root));
                Ok(Some(Workspace {
                    kind: WorkspaceKind::Single,
                    root,
                    packages: vec![package],
                }))
            }
            None => Ok(None),
        }
    }

    /// The package with the longest absolute-path prefix match, so nested
    /// packages resolve to the innermost one.
    pub fn find_package_for_path(&self, path: &Path) -> Option<&DiscoveredPackage> {
        self.packages
            .iter()
            .filter(|package| path.starts_with(&package.path))
            .max_by_key(|package| package.path.components().count())
    }

    pub fn package_named(&self, name: &str) -> Option<&DiscoveredPackage> {
        self.packages.iter().find(|package| package.name == name)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Expands member patterns into validated packages. Ignore globs take
/// precedence over includes; every match must carry a package manifest.
fn expand_members(
    root: &Path,
    patterns: &[String],
    ignore: &[String],
    binding: &LanguageBinding,
) -> Result<Vec<DiscoveredPackage>> {
    let ignore_set = compile_globs(ignore)?;
    let mut candidates: Vec<PathBuf> = Vec::new();

    let mut glob_patterns = Vec::new();
    for pattern in patterns {
        if pattern.contains(['*', '?', '[']) {
            glob_patterns.push(pattern.clone());
        } else {
            candidates.push(root.join(pattern));
        }
    }

    if !glob_patterns.is_empty() {
        let include_set = compile_globs(&glob_patterns)?;
        let walker = WalkBuilder::new(root).git_ignore(true).build();
        for entry in walker.flatten() {
            if !entry.file_type().is_some_and(|ft| ft.is_dir()) {
                continue;
            }
            let path = entry.into_path();
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");
            if relative.is_empty() {
                continue;
            }
            if include_set.is_match(&relative) {
                candidates.push(path);
            }
        }
    }

    let mut packages = Vec::new();
    for dir in candidates {
        let Ok(relative) = dir.strip_prefix(root) else {
            continue;
        };
        let relative = relative.to_string_lossy().replace('\\', "/");
        if ignore_set.is_match(&relative) {
            continue;
        }
        if let Some(package) = package_at(&dir, root, binding) {
            if !packages.iter().any(|p: &DiscoveredPackage| p.path == package.path) {
                packages.push(package);
            }
        }
    }

    packages.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(packages)
}

fn compile_globs(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).map_err(|e| {
            crate::error::SymdexError::Internal(format!("bad member glob {}: {}", pattern, e))
        })?);
    }
    builder
        .build()
        .map_err(|e| crate::error::SymdexError::Internal(e.to_string()))
}

fn package_at(dir: &Path, root: &Path, binding: &LanguageBinding) -> Option<DiscoveredPackage> {
    let manifest_path = dir.join(&binding.package_manifest);
    if !manifest_path.is_file() {
        return None;
    }
    let manifest: PackageManifest = read_json(&manifest_path).ok()?;
    let relative_path = dir
        .strip_prefix(root)
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();
    let name = manifest.name.unwrap_or_else(|| dir_name(dir));
    Some(DiscoveredPackage {
        name,
        path: dir.to_path_buf(),
        version: manifest.version,
        relative_path,
    })
}

fn fallback_package(dir: &Path, root: &Path) -> DiscoveredPackage {
    DiscoveredPackage {
        name: dir_name(dir),
        path: dir.to_path_buf(),
        version: None,
        relative_path: dir
            .strip_prefix(root)
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default(),
    }
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "package".to_string())
}
