//! Resolved-dependency lockfile: which packages a project depends on, where
//! each one came from, and the cache key its index artifact lives under.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DependencySource {
    Hosted,
    Git,
    Path,
    Sdk,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LockedPackage {
    pub name: String,
    pub source: DependencySource,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

/// Parsed `packages.lock.json`. Packages with `source: "sdk"` are framework
/// packages shipped alongside the SDK named by the top-level `sdk` field.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Lockfile {
    #[serde(default)]
    pub sdk: Option<String>,
    #[serde(default)]
    pub packages: Vec<LockedPackage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedDependency {
    pub name: String,
    pub cache_key: String,
    pub source: DependencySource,
    pub version: Option<String>,
}

impl Lockfile {
    pub fn parse(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn parse_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn resolved(&self) -> Vec<ResolvedDependency> {
        self.packages
            .iter()
            .map(|package| ResolvedDependency {
                name: package.name.clone(),
                cache_key: cache_key_for(package, self.sdk.as_deref()),
                source: package.source,
                version: package
                    .version
                    .clone()
                    .or_else(|| match package.source {
                        DependencySource::Sdk => self.sdk.clone(),
                        _ => None,
                    }),
            })
            .collect()
    }
}

fn cache_key_for(package: &LockedPackage, sdk: Option<&str>) -> String {
    match package.source {
        DependencySource::Hosted => format!(
            "{}-{}",
            package.name,
            package.version.as_deref().unwrap_or("unknown")
        ),
        DependencySource::Git => {
            let repo = package
                .repo
                .as_deref()
                .map(repo_short_name)
                .unwrap_or(&package.name);
            let commit = package.commit.as_deref().unwrap_or("HEAD");
            let short = &commit[..commit.len().min(8)];
            format!("{}-{}", repo, short)
        }
        DependencySource::Path => package.name.clone(),
        DependencySource::Sdk => format!(
            "{}-{}",
            package.name,
            package.version.as_deref().or(sdk).unwrap_or("unknown")
        ),
    }
}

fn repo_short_name(repo: &str) -> &str {
    let tail = repo.trim_end_matches('/').rsplit('/').next().unwrap_or(repo);
    tail.strip_suffix(".git").unwrap_or(tail)
}

/// Dependencies present in `new` but not in `old`. Removals are deliberately
/// not reported: unloading on removal trades memory for churn, and the
/// watcher keeps removed dependencies loaded.
pub fn added_dependencies(old: &Lockfile, new: &Lockfile) -> Vec<ResolvedDependency> {
    let known: HashSet<ResolvedDependency> = old.resolved().into_iter().collect();
    new.resolved()
        .into_iter()
        .filter(|dep| !known.contains(dep))
        .collect()
}

/// Outcome of loading every dependency named by a lockfile, per provenance.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DependencyLoadResult {
    pub sdk_loaded: bool,
    pub sdk_version: Option<String>,
    pub framework_loaded: Vec<String>,
    pub framework_missing: Vec<String>,
    pub hosted_loaded: Vec<String>,
    pub hosted_missing: Vec<String>,
    pub git_loaded: Vec<String>,
    pub git_missing: Vec<String>,
    pub local_loaded: Vec<String>,
    pub local_missing: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCKFILE: &str = r#"{
        "sdk": "1.4.0",
        "packages": [
            {"name": "ui", "source": "sdk"},
            {"name": "http", "source": "hosted", "version": "0.9.1"},
            {"name": "utils", "source": "git", "repo": "https://example.com/org/utils.git", "commit": "9f2c41d0aa31"},
            {"name": "sibling", "source": "path", "path": "../sibling"}
        ]
    }"#;

    #[test]
    fn cache_keys_follow_provenance() {
        let lockfile = Lockfile::parse_str(LOCKFILE).unwrap();
        let resolved = lockfile.resolved();
        assert_eq!(resolved[0].cache_key, "ui-1.4.0");
        assert_eq!(resolved[1].cache_key, "http-0.9.1");
        assert_eq!(resolved[2].cache_key, "utils-9f2c41d0");
        assert_eq!(resolved[3].cache_key, "sibling");
    }

    #[test]
    fn diff_reports_added_only() {
        let old = Lockfile::parse_str(r#"{"packages": [{"name": "http", "source": "hosted", "version": "0.9.1"}]}"#).unwrap();
        let new = Lockfile::parse_str(
            r#"{"packages": [
                {"name": "http", "source": "hosted", "version": "0.9.1"},
                {"name": "json", "source": "hosted", "version": "2.0.0"}
            ]}"#,
        )
        .unwrap();
        let added = added_dependencies(&old, &new);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].name, "json");

        // Removal produces nothing.
        assert!(added_dependencies(&new, &old).is_empty());
    }
}
