use std::path::PathBuf;
use symdex::indexer::IndexUpdate;
use symdex::{Context, ContextUpdate, OpenOptions};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

pub async fn run(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let analyzers = super::analyzers();
    let Some(factory) = analyzers.find_for(&path) else {
        return Err(super::no_analyzer_error(&path));
    };

    let options = OpenOptions {
        watch: true,
        load_dependencies: true,
        ..OpenOptions::default()
    };
    let context = Context::open(&path, factory, options).await?;
    let mut updates = context.updates();
    info!("watching {} for changes", path.display());

    loop {
        match updates.recv().await {
            Ok(ContextUpdate::Index { package, update }) => match update {
                IndexUpdate::Initial {
                    file_count,
                    symbol_count,
                    ..
                } => info!(
                    "[{}] re-indexed: {} files, {} symbols",
                    package, file_count, symbol_count
                ),
                IndexUpdate::FileUpdated { path, symbol_count } => info!(
                    "[{}] updated {} ({} symbols)",
                    package,
                    path.display(),
                    symbol_count
                ),
                IndexUpdate::FileRemoved { path } => {
                    info!("[{}] removed {}", package, path.display())
                }
                IndexUpdate::Error { message, path } => match path {
                    Some(path) => error!("[{}] {}: {}", package, path.display(), message),
                    None => error!("[{}] {}", package, message),
                },
            },
            Ok(ContextUpdate::StructuralChange { path }) => info!(
                "workspace structure changed ({}); restart to pick up new members",
                path.display()
            ),
            Err(RecvError::Lagged(skipped)) => {
                warn!("update stream lagged, dropped {} events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    context.dispose();
    Ok(())
}
