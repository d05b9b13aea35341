use std::path::PathBuf;
use symdex::{Context, OpenOptions};
use tracing::info;

pub async fn run(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let analyzers = super::analyzers();
    let Some(factory) = analyzers.find_for(&path) else {
        return Err(super::no_analyzer_error(&path));
    };

    info!("indexing project at {}", path.display());
    let options = OpenOptions {
        // Full rebuild: ignore any cached artifact, then persist fresh.
        use_cache: false,
        ..OpenOptions::default()
    };
    let context = Context::open(&path, factory, options).await?;

    let stats = context.query("stats").await?;
    println!("{}", stats.render());
    context.dispose();
    Ok(())
}
