use std::path::PathBuf;
use symdex::registry::cache::CacheLayout;
use tracing::info;

pub fn run(path: Option<PathBuf>, all: bool) -> Result<(), Box<dyn std::error::Error>> {
    let cache = CacheLayout::from_env();
    if all {
        if cache.root().exists() {
            std::fs::remove_dir_all(cache.root())?;
        }
        info!("removed cache at {}", cache.root().display());
        return Ok(());
    }

    let Some(path) = path else {
        return Err("pass a project path or --all".into());
    };
    let dir = cache.project_dir(&path);
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
        info!("removed cached index for {}", path.display());
    } else {
        info!("no cached index for {}", path.display());
    }
    Ok(())
}
