mod common;

use common::{write_file, write_module_manifest};
use symdex::analyzer::LanguageBinding;
use symdex::workspace::{Workspace, WorkspaceKind};

#[test]
fn single_package_has_no_members_declared() {
    let dir = tempfile::tempdir().unwrap();
    write_module_manifest(dir.path(), "app");
    write_file(dir.path(), "lib/main.ax", "class App\nend\n");

    let workspace = Workspace::detect(&dir.path().join("lib"), &LanguageBinding::default())
        .unwrap()
        .unwrap();
    assert_eq!(workspace.kind, WorkspaceKind::Single);
    assert_eq!(workspace.root, dir.path());
    assert_eq!(workspace.packages.len(), 1);
    assert_eq!(workspace.packages[0].name, "app");
}

#[test]
fn manifest_workspace_enumerates_members() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "module.json",
        r#"{"name": "root", "workspace": ["packages/core", "packages/app"]}"#,
    );
    write_module_manifest(&dir.path().join("packages/core"), "core");
    write_module_manifest(&dir.path().join("packages/app"), "app");

    let workspace = Workspace::detect(dir.path(), &LanguageBinding::default())
        .unwrap()
        .unwrap();
    assert_eq!(workspace.kind, WorkspaceKind::Manifest);
    let names: Vec<&str> = workspace.packages.iter().map(|p| p.name.as_str()).collect();
    // Sorted by relative path.
    assert_eq!(names, vec!["app", "core"]);
}

#[test]
fn tool_workspace_expands_globs_with_ignore_precedence() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "workspace.config.json",
        r#"{"name": "mono", "packages": ["packages/*"], "ignore": ["packages/legacy*"]}"#,
    );
    write_module_manifest(&dir.path().join("packages/core"), "core");
    write_module_manifest(&dir.path().join("packages/app"), "app");
    write_module_manifest(&dir.path().join("packages/legacy-auth"), "legacy-auth");
    // A directory without a manifest is not a package.
    std::fs::create_dir_all(dir.path().join("packages/scratch")).unwrap();

    let workspace = Workspace::detect(dir.path(), &LanguageBinding::default())
        .unwrap()
        .unwrap();
    assert_eq!(workspace.kind, WorkspaceKind::Tool);
    let names: Vec<&str> = workspace.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["app", "core"]);
}

#[test]
fn detection_walks_up_from_a_nested_path() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "workspace.config.json",
        r#"{"packages": ["packages/*"]}"#,
    );
    write_module_manifest(&dir.path().join("packages/core"), "core");
    write_file(&dir.path().join("packages/core"), "lib/deep/a.ax", "");

    let start = dir.path().join("packages/core/lib/deep");
    let workspace = Workspace::detect(&start, &LanguageBinding::default())
        .unwrap()
        .unwrap();
    assert_eq!(workspace.kind, WorkspaceKind::Tool);
    assert_eq!(workspace.root, dir.path());
}

#[test]
fn package_for_path_prefers_innermost() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "workspace.config.json",
        r#"{"packages": ["packages/*", "packages/app/plugins/*"]}"#,
    );
    write_module_manifest(&dir.path().join("packages/app"), "app");
    write_module_manifest(&dir.path().join("packages/app/plugins/metrics"), "metrics");

    let workspace = Workspace::detect(dir.path(), &LanguageBinding::default())
        .unwrap()
        .unwrap();
    assert_eq!(workspace.packages.len(), 2);

    let outer = workspace
        .find_package_for_path(&dir.path().join("packages/app/lib/main.ax"))
        .unwrap();
    assert_eq!(outer.name, "app");

    // Every file under the nested package resolves to the nested package.
    let inner = workspace
        .find_package_for_path(&dir.path().join("packages/app/plugins/metrics/lib/m.ax"))
        .unwrap();
    assert_eq!(inner.name, "metrics");

    assert!(workspace
        .find_package_for_path(&dir.path().join("elsewhere/x.ax"))
        .is_none());
}

#[test]
fn no_marker_means_no_workspace() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "lib/main.ax", "");
    let detected = Workspace::detect(dir.path(), &LanguageBinding::default()).unwrap();
    // Ancestors of a tempdir may hold anything; just check the fixture dir
    // itself was not misread as a package.
    if let Some(workspace) = detected {
        assert_ne!(workspace.root, dir.path());
    }
}
