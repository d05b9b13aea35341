use std::path::PathBuf;
use symdex::analyzer::LanguageBinding;
use symdex::query::QueryExecutor;
use symdex::registry::cache::CacheLayout;

pub async fn run(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let binding = LanguageBinding::default();
    let cache = CacheLayout::from_env();
    let registry = super::query::open_registry(&path, &binding, &cache, true)?;
    let result = QueryExecutor::new(&registry).execute("stats").await;
    println!("{}", result.render());
    Ok(())
}
