// tests/hasher.rs

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use monodag::config::WorkspaceConfig;
use monodag::graph::{FileData, ProjectGraphBuilder};
use monodag::hash::{TaskHash, TaskHasher, apply_hashes};
use monodag::tasks::{TaskRequest, create_task_graph};
use monodag_test_utils::builders::{ProjectBuilder, TargetBuilder, WorkspaceConfigBuilder};
use proptest::prelude::*;

/// web depends on ui; web:build hashes its own files plus ui's.
fn config() -> WorkspaceConfig {
    WorkspaceConfigBuilder::new()
        .with_named_input("production", &["default", "!{projectRoot}/**/*.spec.ts"])
        .with_project(
            ProjectBuilder::new("web", "apps/web")
                .implicit_dependency("ui")
                .target("build", TargetBuilder::command("make").build())
                .target(
                    "lint",
                    TargetBuilder::command("eslint")
                        .input("production")
                        .env_input("LINT_STRICT")
                        .build(),
                )
                .target("deploy", TargetBuilder::command("ship").cache(false).build())
                .build(),
        )
        .with_project(ProjectBuilder::new("ui", "libs/ui").build())
        .with_project(ProjectBuilder::new("docs", "docs").build())
        .with_dependency("react", "18.2.0")
        .build()
}

fn files(overrides: &[(&str, &str)]) -> Vec<FileData> {
    let mut map: BTreeMap<&str, &str> = BTreeMap::from([
        ("apps/web/main.ts", "w1"),
        ("apps/web/main.spec.ts", "s1"),
        ("libs/ui/index.ts", "u1"),
        ("docs/index.md", "d1"),
    ]);
    map.extend(overrides.iter().copied());
    map.into_iter()
        .map(|(file, hash)| FileData {
            file: file.to_string(),
            hash: hash.to_string(),
        })
        .collect()
}

async fn hash_of(
    config: &WorkspaceConfig,
    files: &[FileData],
    env: &[(&str, &str)],
    target: &str,
) -> Option<TaskHash> {
    let outcome = ProjectGraphBuilder::new(Path::new("/ws"), config, &[])
        .build(files, None)
        .await;
    let graph = Arc::new(outcome.graph);
    let tasks = create_task_graph(&graph, &[TaskRequest::new("web", target)]).unwrap();
    let env = env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    let hasher = Arc::new(TaskHasher::new(
        Arc::clone(&graph),
        Arc::new(outcome.file_map),
        config.target_defaults().clone(),
        env,
        Path::new("/ws"),
    ));
    let list: Vec<_> = tasks.tasks.values().cloned().collect();
    let mut hashes = hasher.hash_tasks(&list).await.unwrap();
    hashes.remove(&format!("web:{target}"))
}

#[tokio::test]
async fn hash_is_stable_for_identical_inputs() {
    let config = config();
    let a = hash_of(&config, &files(&[]), &[], "build").await.unwrap();
    let b = hash_of(&config, &files(&[]), &[], "build").await.unwrap();
    assert_eq!(a, b);
    assert!(a.details.nodes.contains_key("web"));
    assert!(a.details.nodes.contains_key("ui:default"));
    assert_eq!(a.details.implicit_deps.get("ext:react"), None);
}

#[tokio::test]
async fn own_and_dependency_files_change_the_hash() {
    let config = config();
    let base = hash_of(&config, &files(&[]), &[], "build").await.unwrap();

    let own = hash_of(&config, &files(&[("apps/web/main.ts", "w2")]), &[], "build")
        .await
        .unwrap();
    assert_ne!(base.value, own.value);

    let dep = hash_of(&config, &files(&[("libs/ui/index.ts", "u2")]), &[], "build")
        .await
        .unwrap();
    assert_ne!(base.value, dep.value);
    assert_eq!(base.details.nodes["web"], dep.details.nodes["web"]);

    // Files of unrelated projects do not matter.
    let other = hash_of(&config, &files(&[("docs/index.md", "d2")]), &[], "build")
        .await
        .unwrap();
    assert_eq!(base.value, other.value);
}

#[tokio::test]
async fn negated_patterns_and_env_inputs() {
    let config = config();
    let base = hash_of(&config, &files(&[]), &[], "lint").await.unwrap();

    // Spec files are excluded from the production input.
    let spec = hash_of(&config, &files(&[("apps/web/main.spec.ts", "s2")]), &[], "lint")
        .await
        .unwrap();
    assert_eq!(base.value, spec.value);

    let strict = hash_of(&config, &files(&[]), &[("LINT_STRICT", "1")], "lint")
        .await
        .unwrap();
    assert_ne!(base.value, strict.value);
    assert!(strict.details.env.contains_key("LINT_STRICT"));
}

/// web:check reads `^production`; `ui_production` is ui's own definition
/// of `production`, if any.
fn override_config(ui_production: Option<&[&str]>) -> WorkspaceConfig {
    let mut ui = ProjectBuilder::new("ui", "libs/ui");
    if let Some(inputs) = ui_production {
        ui = ui.named_input("production", inputs);
    }
    WorkspaceConfigBuilder::new()
        .with_named_input("production", &["default"])
        .with_project(
            ProjectBuilder::new("web", "apps/web")
                .implicit_dependency("ui")
                .target(
                    "check",
                    TargetBuilder::command("tsc").input("default").input("^production").build(),
                )
                .build(),
        )
        .with_project(ui.build())
        .build()
}

#[tokio::test]
async fn dependency_redefinition_of_a_named_input_narrows_what_is_hashed() {
    let narrowed = override_config(Some(&["default", "!{projectRoot}/**/*.spec.ts"]));
    let with_spec = |hash: &'static str| files(&[("libs/ui/x.spec.ts", hash)]);

    let base = hash_of(&narrowed, &with_spec("x1"), &[], "check").await.unwrap();
    let spec_changed = hash_of(&narrowed, &with_spec("x2"), &[], "check").await.unwrap();
    assert_eq!(base.value, spec_changed.value);

    let mut source_changed = with_spec("x1");
    for file in &mut source_changed {
        if file.file == "libs/ui/index.ts" {
            file.hash = "u2".to_string();
        }
    }
    let source_changed = hash_of(&narrowed, &source_changed, &[], "check").await.unwrap();
    assert_ne!(base.value, source_changed.value);

    // Without ui's own definition the workspace one applies, so `*.spec.ts` counts.
    let plain = override_config(None);
    let before = hash_of(&plain, &with_spec("x1"), &[], "check").await.unwrap();
    let after = hash_of(&plain, &with_spec("x2"), &[], "check").await.unwrap();
    assert_ne!(before.value, after.value);
}

#[tokio::test]
async fn non_cacheable_tasks_are_not_hashed() {
    let config = config();
    assert!(hash_of(&config, &files(&[]), &[], "deploy").await.is_none());
}

#[tokio::test]
async fn apply_hashes_stores_values_on_tasks() {
    let config = config();
    let outcome = ProjectGraphBuilder::new(Path::new("/ws"), &config, &[])
        .build(&files(&[]), None)
        .await;
    let graph = Arc::new(outcome.graph);
    let mut tasks = create_task_graph(&graph, &[TaskRequest::new("web", "build")]).unwrap();
    let hasher = Arc::new(TaskHasher::new(
        Arc::clone(&graph),
        Arc::new(outcome.file_map),
        BTreeMap::new(),
        BTreeMap::new(),
        Path::new("/ws"),
    ));
    let list: Vec<_> = tasks.tasks.values().cloned().collect();
    let hashes = hasher.hash_tasks(&list).await.unwrap();

    apply_hashes(&mut tasks, &hashes);
    let task = tasks.task("web:build").unwrap();
    assert_eq!(task.hash.as_deref(), Some(hashes["web:build"].value.as_str()));
}

async fn hash_all(
    config: &WorkspaceConfig,
    files: &[FileData],
    order: &[usize],
) -> BTreeMap<String, String> {
    let outcome = ProjectGraphBuilder::new(Path::new("/ws"), config, &[])
        .build(files, None)
        .await;
    let graph = Arc::new(outcome.graph);
    let requests = [
        TaskRequest::new("web", "build"),
        TaskRequest::new("web", "lint"),
    ];
    let tasks = create_task_graph(&graph, &requests).unwrap();
    let hasher = Arc::new(TaskHasher::new(
        Arc::clone(&graph),
        Arc::new(outcome.file_map),
        config.target_defaults().clone(),
        BTreeMap::new(),
        Path::new("/ws"),
    ));
    let all: Vec<_> = tasks.tasks.values().cloned().collect();
    let list: Vec<_> = order.iter().map(|i| all[i % all.len()].clone()).collect();
    hasher
        .hash_tasks(&list)
        .await
        .unwrap()
        .into_iter()
        .map(|(id, hash)| (id, hash.value))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn hashes_do_not_depend_on_request_order(
        contents in proptest::collection::vec("[a-f0-9]{1,8}", 4),
        order in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        let config = config();
        let files = files(&[
            ("apps/web/main.ts", contents[0].as_str()),
            ("apps/web/main.spec.ts", contents[1].as_str()),
            ("libs/ui/index.ts", contents[2].as_str()),
            ("docs/index.md", contents[3].as_str()),
        ]);
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let sorted: Vec<usize> = (0..8).collect();
        let expected = runtime.block_on(hash_all(&config, &files, &sorted));
        let shuffled = runtime.block_on(hash_all(&config, &files, &order));
        prop_assert_eq!(expected, shuffled);
    }
}
