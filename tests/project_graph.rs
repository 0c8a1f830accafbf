// tests/project_graph.rs

use std::path::Path;
use std::sync::Arc;

use monodag::graph::{
    DependencyEdge, DependencyKind, FileData, GraphIndex, ProjectGraphBuilder,
};
use monodag::plugin::GraphPlugin;
use monodag_test_utils::builders::{ProjectBuilder, TargetBuilder, WorkspaceConfigBuilder};
use monodag_test_utils::init_tracing;
use monodag_test_utils::plugins::StaticPlugin;

fn file(path: &str, hash: &str) -> FileData {
    FileData {
        file: path.to_string(),
        hash: hash.to_string(),
    }
}

fn files() -> Vec<FileData> {
    vec![
        file("apps/web/main.ts", "a1"),
        file("libs/ui/index.ts", "b1"),
        file("libs/util/index.ts", "c1"),
        file("README.md", "d1"),
    ]
}

fn plugins(list: Vec<StaticPlugin>) -> Vec<Arc<dyn GraphPlugin>> {
    list.into_iter()
        .map(|p| Arc::new(p) as Arc<dyn GraphPlugin>)
        .collect()
}

fn three_projects() -> WorkspaceConfigBuilder {
    WorkspaceConfigBuilder::new()
        .with_project(
            ProjectBuilder::new("web", "apps/web")
                .target("build", TargetBuilder::command("tsc").build())
                .build(),
        )
        .with_project(ProjectBuilder::new("ui", "libs/ui").build())
        .with_project(ProjectBuilder::new("util", "libs/util").build())
}

#[tokio::test]
async fn builds_nodes_files_and_implicit_edges() {
    init_tracing();
    let config = WorkspaceConfigBuilder::new()
        .with_project(
            ProjectBuilder::new("web", "apps/web")
                .implicit_dependency("ui")
                .build(),
        )
        .with_project(ProjectBuilder::new("ui", "libs/ui").build())
        .with_dependency("react", "18.2.0")
        .build();

    let outcome = ProjectGraphBuilder::new(Path::new("/ws"), &config, &[])
        .build(&files(), None)
        .await;

    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
    let graph = &outcome.graph;
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.project_dependencies_of("web"), vec!["ui"]);
    assert!(graph.external_nodes.contains_key("ext:react"));

    assert_eq!(outcome.file_map.files_of("web").len(), 1);
    assert_eq!(outcome.file_map.files_of("ui")[0].file, "libs/ui/index.ts");
    let loose: Vec<&str> = outcome
        .file_map
        .non_project_files
        .iter()
        .map(|f| f.file.as_str())
        .collect();
    assert_eq!(loose, vec!["README.md", "libs/util/index.ts"]);
}

#[tokio::test]
async fn wildcard_and_negated_implicit_dependencies() {
    let config = WorkspaceConfigBuilder::new()
        .with_project(
            ProjectBuilder::new("web", "apps/web")
                .implicit_dependency("*")
                .implicit_dependency("!util")
                .build(),
        )
        .with_project(ProjectBuilder::new("ui", "libs/ui").build())
        .with_project(ProjectBuilder::new("util", "libs/util").build())
        .build();

    let outcome = ProjectGraphBuilder::new(Path::new("/ws"), &config, &[])
        .build(&files(), None)
        .await;

    assert_eq!(outcome.graph.project_dependencies_of("web"), vec!["ui"]);
}

#[tokio::test]
async fn plugin_nodes_merge_with_declared_config() {
    let inferred = ProjectBuilder::new("web", "apps/web")
        .target("lint", TargetBuilder::command("eslint .").build())
        .target("build", TargetBuilder::command("webpack").build())
        .build();
    let plugins = plugins(vec![StaticPlugin::new("inferred").project(inferred)]);
    let config = three_projects().build();

    let outcome = ProjectGraphBuilder::new(Path::new("/ws"), &config, &plugins)
        .build(&files(), None)
        .await;

    assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
    let web = outcome.graph.node("web").unwrap();
    assert!(web.has_target("lint"));
    // Declared configuration wins over inferred.
    assert_eq!(
        web.targets["build"].options.get("command"),
        Some(&serde_json::json!("tsc"))
    );
    assert_eq!(outcome.source_maps["web"]["targets.lint"], "inferred");
}

#[tokio::test]
async fn failing_plugin_only_loses_its_own_contribution() {
    let good = StaticPlugin::new("good").edge(
        DependencyEdge::new("web", "ui", DependencyKind::Static).with_source_file("apps/web/main.ts"),
    );
    let bad = StaticPlugin::new("bad").failing("boom");
    let plugins = plugins(vec![good, bad]);
    let config = three_projects().build();

    let outcome = ProjectGraphBuilder::new(Path::new("/ws"), &config, &plugins)
        .build(&files(), None)
        .await;

    assert_eq!(outcome.graph.project_dependencies_of("web"), vec!["ui"]);
    let plugins: Vec<_> = outcome.errors.iter().filter_map(|e| e.plugin()).collect();
    assert_eq!(plugins, vec!["bad", "bad"]);

    let aggregate = outcome.result().unwrap_err();
    assert!(!aggregate.is_fatal());
}

#[tokio::test]
async fn invalid_edge_rejects_the_plugin_result() {
    // Source file belongs to `ui`, not `web`.
    let plugin = StaticPlugin::new("deps")
        .edge(DependencyEdge::new("web", "util", DependencyKind::Implicit))
        .edge(
            DependencyEdge::new("web", "ui", DependencyKind::Static)
                .with_source_file("libs/ui/index.ts"),
        );
    let plugins = plugins(vec![plugin]);
    let config = three_projects().build();

    let outcome = ProjectGraphBuilder::new(Path::new("/ws"), &config, &plugins)
        .build(&files(), None)
        .await;

    assert!(outcome.graph.project_dependencies_of("web").is_empty());
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].to_string().contains("does not belong to 'web'"));
}

#[tokio::test]
async fn duplicate_project_names_are_fatal() {
    let config = WorkspaceConfigBuilder::new()
        .with_project(ProjectBuilder::new("web", "apps/web").build())
        .with_project(ProjectBuilder::new("web", "libs/ui").build())
        .build();

    let outcome = ProjectGraphBuilder::new(Path::new("/ws"), &config, &[])
        .build(&files(), None)
        .await;

    let aggregate = outcome.result().unwrap_err();
    assert!(aggregate.is_fatal());
    assert!(aggregate.to_string().contains("share the same name 'web'"));
}

#[tokio::test]
async fn incremental_build_keeps_edges_of_unchanged_files() {
    let edge = DependencyEdge::new("web", "ui", DependencyKind::Static)
        .with_source_file("apps/web/main.ts");
    let config = three_projects().build();

    let first_plugins = plugins(vec![StaticPlugin::new("deps").edge(edge.clone())]);
    let first = ProjectGraphBuilder::new(Path::new("/ws"), &config, &first_plugins)
        .build(&files(), None)
        .await;
    assert_eq!(first.index.plugin_edges, vec![edge.clone()]);

    // Same plugin name, but it finds nothing this time: only changed files
    // are processed, and `apps/web/main.ts` did not change.
    let mut changed = files();
    changed[1].hash = "b2".into();
    let second_plugins = plugins(vec![StaticPlugin::new("deps")]);
    let second = ProjectGraphBuilder::new(Path::new("/ws"), &config, &second_plugins)
        .build(&changed, Some(&first.index))
        .await;
    assert_eq!(second.graph.project_dependencies_of("web"), vec!["ui"]);

    // Once the source file changes, the carried edge is dropped.
    let mut touched = files();
    touched[0].hash = "a2".into();
    let third = ProjectGraphBuilder::new(Path::new("/ws"), &config, &second_plugins)
        .build(&touched, Some(&first.index))
        .await;
    assert!(third.graph.project_dependencies_of("web").is_empty());
}

#[tokio::test]
async fn index_round_trips_through_the_file_system() {
    use monodag::fs::mock::MockFileSystem;

    let config = three_projects().build();
    let outcome = ProjectGraphBuilder::new(Path::new("/ws"), &config, &[])
        .build(&files(), None)
        .await;

    let fs = MockFileSystem::new();
    let path = Path::new("/ws/.monodag/cache/project-graph-index.json");
    outcome.index.save(&fs, path).unwrap();
    let loaded = GraphIndex::load(&fs, path).unwrap();
    assert_eq!(loaded.file_hashes, outcome.index.file_hashes);
    assert_eq!(loaded.project_roots, outcome.index.project_roots);
}
