// tests/task_graph.rs

use std::collections::BTreeMap;

use monodag::config::{DependsOnConfig, WorkspaceConfig};
use monodag::errors::MonodagError;
use monodag::tasks::{TaskRequest, create_task_graph};
use monodag_test_utils::builders::{ProjectBuilder, TargetBuilder, WorkspaceConfigBuilder};
use monodag_test_utils::graphs::project_graph;
use serde_json::json;

/// web -> ui -> util, every project with a `build` depending on `^build`.
fn layered() -> WorkspaceConfig {
    let build = || TargetBuilder::command("make").depends_on("^build").build();
    WorkspaceConfigBuilder::new()
        .with_project(
            ProjectBuilder::new("web", "apps/web")
                .implicit_dependency("ui")
                .target("build", build())
                .target("test", TargetBuilder::command("jest").depends_on("build").build())
                .build(),
        )
        .with_project(
            ProjectBuilder::new("ui", "libs/ui")
                .implicit_dependency("util")
                .target("build", build())
                .build(),
        )
        .with_project(ProjectBuilder::new("util", "libs/util").target("build", build()).build())
        .build()
}

#[tokio::test]
async fn caret_dependencies_expand_through_the_project_graph() {
    let graph = project_graph(&layered()).await;
    let tasks = create_task_graph(&graph, &[TaskRequest::new("web", "test")]).unwrap();

    let ids: Vec<&String> = tasks.tasks.keys().collect();
    assert_eq!(ids, vec!["ui:build", "util:build", "web:build", "web:test"]);
    assert_eq!(tasks.dependencies_of("web:test"), ["web:build".to_string()]);
    assert_eq!(tasks.dependencies_of("web:build"), ["ui:build".to_string()]);
    assert_eq!(tasks.dependencies_of("ui:build"), ["util:build".to_string()]);
    assert_eq!(tasks.roots, vec!["util:build".to_string()]);
}

#[tokio::test]
async fn projects_without_the_target_are_looked_through() {
    let config = WorkspaceConfigBuilder::new()
        .with_project(
            ProjectBuilder::new("web", "apps/web")
                .implicit_dependency("ui")
                .target("build", TargetBuilder::command("make").depends_on("^build").build())
                .build(),
        )
        .with_project(
            ProjectBuilder::new("ui", "libs/ui")
                .implicit_dependency("util")
                .build(),
        )
        .with_project(
            ProjectBuilder::new("util", "libs/util")
                .target("build", TargetBuilder::command("make").build())
                .build(),
        )
        .build();
    let graph = project_graph(&config).await;

    let tasks = create_task_graph(&graph, &[TaskRequest::new("web", "build")]).unwrap();
    assert_eq!(tasks.dependencies_of("web:build"), ["util:build".to_string()]);
    assert!(tasks.task("ui:build").is_none());
}

#[tokio::test]
async fn explicit_project_dependencies() {
    let target = monodag::config::TargetConfig {
        command: Some("deploy".into()),
        depends_on: Some(vec![DependsOnConfig::Explicit {
            target: "build".into(),
            projects: Some(vec!["util".into(), "missing".into()]),
            dependencies: false,
            params: None,
        }]),
        ..Default::default()
    };
    let config = WorkspaceConfigBuilder::new()
        .with_project(ProjectBuilder::new("web", "apps/web").target("deploy", target).build())
        .with_project(
            ProjectBuilder::new("util", "libs/util")
                .target("build", TargetBuilder::command("make").build())
                .build(),
        )
        .build();
    let graph = project_graph(&config).await;

    let tasks = create_task_graph(&graph, &[TaskRequest::new("web", "deploy")]).unwrap();
    assert_eq!(tasks.dependencies_of("web:deploy"), ["util:build".to_string()]);
}

#[tokio::test]
async fn configurations_and_overrides_shape_options() {
    let config = WorkspaceConfigBuilder::new()
        .with_project(
            ProjectBuilder::new("web", "apps/web")
                .target(
                    "build",
                    TargetBuilder::command("make")
                        .option("mode", json!("dev"))
                        .option("minify", json!(false))
                        .configuration("production", &[("mode", json!("prod"))])
                        .default_configuration("production")
                        .build(),
                )
                .build(),
        )
        .build();
    let graph = project_graph(&config).await;

    // Unknown configuration falls back to the default one.
    let mut request = TaskRequest::new("web", "build");
    request.configuration = Some("staging".into());
    request.overrides = BTreeMap::from([("minify".to_string(), json!(true))]);
    let tasks = create_task_graph(&graph, &[request]).unwrap();

    let task = tasks.task("web:build:production").unwrap();
    assert_eq!(task.options["mode"], json!("prod"));
    assert_eq!(task.options["minify"], json!(true));
    assert_eq!(task.overrides.len(), 1);
    assert_eq!(task.project_root, "apps/web");
    assert_eq!(task.executor, "run-commands");
}

#[tokio::test]
async fn build_targets_get_conventional_outputs() {
    let graph = project_graph(&layered()).await;
    let tasks = create_task_graph(&graph, &[TaskRequest::new("util", "build")]).unwrap();
    let task = tasks.task("util:build").unwrap();
    assert_eq!(
        task.outputs,
        vec!["dist/libs/util", "libs/util/dist", "libs/util/build", "libs/util/public"]
    );
    assert!(task.cache);
}

#[tokio::test]
async fn missing_project_or_target_is_reported() {
    let graph = project_graph(&layered()).await;

    let err = create_task_graph(&graph, &[TaskRequest::new("nope", "build")]).unwrap_err();
    assert!(matches!(err, MonodagError::TaskNotFound(_)));

    let err = create_task_graph(&graph, &[TaskRequest::new("util", "test")]).unwrap_err();
    assert!(matches!(err, MonodagError::TaskNotFound(ref t) if t == "util:test"));
}

#[tokio::test]
async fn cycles_are_rejected() {
    let config = WorkspaceConfigBuilder::new()
        .with_project(
            ProjectBuilder::new("a", "libs/a")
                .target("build", TargetBuilder::command("make").depends_on("b:build").build())
                .build(),
        )
        .with_project(
            ProjectBuilder::new("b", "libs/b")
                .target("build", TargetBuilder::command("make").depends_on("a:build").build())
                .build(),
        )
        .build();
    let graph = project_graph(&config).await;

    let err = create_task_graph(&graph, &[TaskRequest::new("a", "build")]).unwrap_err();
    match err {
        MonodagError::TaskGraphCycle(chain) => {
            assert_eq!(chain, vec!["a:build", "b:build", "a:build"]);
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[tokio::test]
async fn shared_dependencies_are_created_once() {
    let graph = project_graph(&layered()).await;
    let tasks = create_task_graph(
        &graph,
        &[TaskRequest::new("web", "build"), TaskRequest::new("ui", "build")],
    )
    .unwrap();
    assert_eq!(tasks.len(), 3);
    let dependents = tasks.transitive_dependents_of("util:build");
    assert!(dependents.contains("web:build"));
    assert!(dependents.contains("ui:build"));
}
