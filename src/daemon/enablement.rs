// src/daemon/enablement.rs

//! Whether a run should go through the daemon.

use crate::config::WorkspaceConfig;

/// Environment variable forcing the daemon on or off.
pub const DAEMON_ENV_VAR: &str = "MONODAG_DAEMON";

/// Variables set by common CI providers.
const CI_ENV_VARS: &[&str] = &[
    "CI",
    "GITHUB_ACTIONS",
    "GITLAB_CI",
    "BUILDKITE",
    "CIRCLECI",
    "TF_BUILD",
    "JENKINS_URL",
];

/// Decide from the CI flag, `MONODAG_DAEMON` and `use_daemon_process`:
///
/// | CI  | env      | config     | daemon |
/// |-----|----------|------------|--------|
/// | yes | not true | any        | off    |
/// | any | false    | any        | off    |
/// | any | unset    | false      | off    |
/// | any | true     | any        | on     |
/// | no  | unset    | unset/true | on     |
pub fn daemon_enabled(ci: bool, env: Option<bool>, config: Option<bool>) -> bool {
    match (ci, env, config) {
        (_, Some(true), _) => true,
        (true, _, _) => false,
        (_, Some(false), _) => false,
        (_, None, Some(false)) => false,
        (false, None, _) => true,
    }
}

/// `true`/`1` and `false`/`0`; anything else counts as unset.
pub fn parse_env_flag(value: Option<&str>) -> Option<bool> {
    match value?.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

pub fn is_ci() -> bool {
    CI_ENV_VARS.iter().any(|name| {
        std::env::var(name).is_ok_and(|v| !v.is_empty() && v != "false" && v != "0")
    })
}

/// Apply [`daemon_enabled`] to the current process environment.
pub fn should_use_daemon(config: &WorkspaceConfig) -> bool {
    let env = std::env::var(DAEMON_ENV_VAR).ok();
    daemon_enabled(
        is_ci(),
        parse_env_flag(env.as_deref()),
        config.workspace().use_daemon_process,
    )
}
