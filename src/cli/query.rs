use std::path::PathBuf;
use std::sync::Arc;
use symdex::analyzer::LanguageBinding;
use symdex::index::persist;
use symdex::query::QueryExecutor;
use symdex::registry::cache::CacheLayout;
use symdex::registry::IndexRegistry;
use symdex::workspace::Workspace;
use tokio::sync::RwLock;

pub async fn run(
    path: PathBuf,
    query: String,
    json: bool,
    deps: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let binding = LanguageBinding::default();
    let cache = CacheLayout::from_env();
    let registry = open_registry(&path, &binding, &cache, deps)?;

    let result = QueryExecutor::new(&registry).execute(&query).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", result.render());
    }
    Ok(())
}

/// Builds a read-only registry over the project's cached artifact plus
/// whatever sibling/dependency indexes are on disk.
pub fn open_registry(
    path: &PathBuf,
    binding: &LanguageBinding,
    cache: &CacheLayout,
    deps: bool,
) -> Result<IndexRegistry, Box<dyn std::error::Error>> {
    let artifact_dir = cache.project_dir(path);
    if !persist::artifact_exists(&artifact_dir) {
        return Err(format!(
            "no cached index for {} — open the project from an embedding host to index it",
            path.display()
        )
        .into());
    }
    let manifest = persist::read_manifest(&artifact_dir)?;
    let index = persist::load(&artifact_dir, path, Some(path))?;
    let shared = Arc::new(RwLock::new(index));

    let mut registry = IndexRegistry::new(manifest.name.clone(), shared, cache.clone());
    if let Some(workspace) = Workspace::detect(path, binding)? {
        registry.set_workspace_cache(symdex::registry::cache::workspace_cache_dir(&workspace.root));
        for package in &workspace.packages {
            if package.name != manifest.name {
                let _ = registry.load_local_package(&package.name);
            }
        }
    }

    if deps {
        let lockfile = path.join(&binding.lockfile);
        if lockfile.is_file() {
            let result = registry.load_from_lockfile(&lockfile)?;
            let missing = result.hosted_missing.len()
                + result.git_missing.len()
                + result.framework_missing.len()
                + result.local_missing.len();
            if missing > 0 {
                tracing::warn!("{} dependencies have no cached index", missing);
            }
        }
    }
    Ok(registry)
}
