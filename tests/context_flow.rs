mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use symdex::indexer::IndexUpdate;
use symdex::query::QueryResult;
use symdex::registry::cache::CacheLayout;
use symdex::{Context, ContextUpdate, OpenOptions, SymdexError};

fn test_options(cache_root: &std::path::Path) -> OpenOptions {
    OpenOptions {
        watch: false,
        use_cache: true,
        load_dependencies: false,
        cache: Some(CacheLayout::with_root(cache_root.to_path_buf())),
        watch_debounce: Duration::from_millis(30),
    }
}

fn seed_workspace(root: &std::path::Path) {
    write_file(
        root,
        "workspace.config.json",
        r#"{"name": "mono", "packages": ["packages/*"]}"#,
    );
    let core = root.join("packages/core");
    write_module_manifest(&core, "core");
    write_file(&core, "lib/repo.ax", "class AuthRepository\n  method login\nend\n");
    let app = root.join("packages/app");
    write_module_manifest(&app, "app");
    write_file(&app, "lib/main.ax", "fn main\n  call core::AuthRepository.login\nend\n");
}

#[tokio::test]
async fn open_single_package_and_query() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("app");
    write_module_manifest(&root, "app");
    write_file(&root, "lib/main.ax", "class Widget\n  method draw\nend\n");

    let context = Context::open(
        &root,
        Arc::new(AxFactory::new()),
        test_options(&dir.path().join("cache")),
    )
    .await
    .unwrap();

    assert_eq!(context.active_package(), "app");
    let result = context.query("def Widget").await.unwrap();
    assert!(matches!(result, QueryResult::Definition { .. }));

    let result = context.query("members Widget").await.unwrap();
    match result {
        QueryResult::Members { members } => assert_eq!(members.len(), 1),
        other => panic!("expected members, got {:?}", other),
    }
    context.dispose();
}

#[tokio::test]
async fn workspace_siblings_federate_through_local_mirrors() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("mono");
    seed_workspace(&root);

    // Open from inside the app package: core becomes a local sibling.
    let context = Context::open(
        &root.join("packages/app"),
        Arc::new(AxFactory::new()),
        test_options(&dir.path().join("cache")),
    )
    .await
    .unwrap();

    assert_eq!(context.active_package(), "app");
    assert_eq!(context.workspace().packages.len(), 2);

    // The sibling's symbol resolves through its mirrored index.
    let result = context.query("def AuthRepository").await.unwrap();
    match result {
        QueryResult::Definition { package, .. } => assert_eq!(package, "core"),
        other => panic!("expected definition, got {:?}", other),
    }

    // The app's call site reaches the sibling-defined id.
    let result = context.query("callers AuthRepository.login").await.unwrap();
    match result {
        QueryResult::CallGraph { symbols, .. } => {
            assert_eq!(symbols.len(), 1);
            assert_eq!(symbols[0].info.display_name, "main");
        }
        other => panic!("expected call graph, got {:?}", other),
    }
    context.dispose();
}

#[tokio::test]
async fn refresh_file_routes_to_owning_package() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("mono");
    seed_workspace(&root);

    let context = Context::open(
        &root,
        Arc::new(AxFactory::new()),
        test_options(&dir.path().join("cache")),
    )
    .await
    .unwrap();
    let mut updates = context.updates();

    let changed = write_file(
        &root.join("packages/core"),
        "lib/repo.ax",
        "class AuthRepository\n  method login\n  method logout\nend\n",
    );
    context.refresh_file(&changed).await.unwrap();

    let update = tokio::time::timeout(Duration::from_secs(5), updates.recv())
        .await
        .expect("timed out")
        .unwrap();
    match update {
        ContextUpdate::Index { package, update } => {
            assert_eq!(package, "core");
            assert!(matches!(update, IndexUpdate::FileUpdated { .. }));
        }
        other => panic!("expected index update, got {:?}", other),
    }
    context.dispose();
}

#[tokio::test]
async fn watcher_picks_up_source_changes() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("mono");
    seed_workspace(&root);

    let mut options = test_options(&dir.path().join("cache"));
    options.watch = true;
    let context = Context::open(&root, Arc::new(AxFactory::new()), options)
        .await
        .unwrap();
    let mut updates = context.updates();

    write_file(
        &root.join("packages/app"),
        "lib/main.ax",
        "fn main\nend\nfn extra\nend\n",
    );

    let wait_for_refresh = async {
        loop {
            let update = updates.recv().await.unwrap();
            if let ContextUpdate::Index {
                package,
                update: IndexUpdate::FileUpdated { .. },
            } = update
            {
                assert_eq!(package, "app");
                break;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait_for_refresh)
        .await
        .expect("no watch-driven update arrived");

    // The new symbol is queryable once the refresh lands.
    let result = context.query("def extra").await.unwrap();
    assert!(matches!(result, QueryResult::Definition { .. }));
    context.dispose();
}

#[tokio::test]
async fn lazy_dependency_loading_reports_missing() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("app");
    write_module_manifest(&root, "app");
    write_file(&root, "lib/main.ax", "fn main\nend\n");
    write_file(
        &root,
        "packages.lock.json",
        r#"{"packages": [{"name": "http", "source": "hosted", "version": "0.9.1"}]}"#,
    );

    let context = Context::open(
        &root,
        Arc::new(AxFactory::new()),
        test_options(&dir.path().join("cache")),
    )
    .await
    .unwrap();

    let result = context.load_dependencies().await.unwrap();
    assert!(result.hosted_loaded.is_empty());
    assert_eq!(result.hosted_missing, vec!["http"]);
    context.dispose();
}

#[tokio::test]
async fn factory_registry_resolves_projects_by_binding() {
    use symdex::analyzer::FactoryRegistry;

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("app");
    write_module_manifest(&root, "app");
    write_file(&root, "lib/main.ax", "class Widget\nend\n");

    let mut analyzers = FactoryRegistry::new();
    assert!(analyzers.find_for(&root).is_none());

    analyzers.register(Arc::new(AxFactory::new()));
    assert!(analyzers.find_for(&dir.path().join("unrelated")).is_none());
    let factory = analyzers
        .find_for(&root)
        .expect("manifest claims the project");

    let context = Context::open(&root, factory, test_options(&dir.path().join("cache")))
        .await
        .unwrap();
    let result = context.query("def Widget").await.unwrap();
    assert!(matches!(result, QueryResult::Definition { .. }));
    context.dispose();
}

#[tokio::test]
async fn dispose_is_idempotent_and_final() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("app");
    write_module_manifest(&root, "app");
    write_file(&root, "lib/main.ax", "fn main\nend\n");

    let context = Context::open(
        &root,
        Arc::new(AxFactory::new()),
        test_options(&dir.path().join("cache")),
    )
    .await
    .unwrap();

    context.dispose();
    context.dispose();
    assert!(matches!(
        context.query("stats").await,
        Err(SymdexError::IndexerDisposed)
    ));
    assert!(matches!(
        context.refresh_all().await,
        Err(SymdexError::IndexerDisposed)
    ));
}
