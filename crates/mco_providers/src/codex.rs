use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use mco_core::{
    Adapter, AdapterOutput, DetectResult, EnforcementMode, Invocation, InvocationError, Mode,
    ParseOutcome, PathConstraints, ProviderSpec, Task,
};

use crate::common::{probe_binary, resolve_binary};
use crate::findings::parse_findings_fallback;

const PROVIDER_ID: &str = "codex";
const ENV_VAR: &str = "CODEX_BINARY";

/// Adapter for the Codex CLI. Codex's non-interactive mode takes the prompt
/// on stdin rather than as an argument, and restricts its working tree only
/// via `-C <dir>`, with no per-path allowlist — under strict enforcement
/// with a target path narrower than the repo root, Codex can't honor the
/// constraint and the adapter reports `PermissionUnmet`.
#[derive(Debug, Default)]
pub struct CodexAdapter;

#[async_trait]
impl Adapter for CodexAdapter {
    fn provider_id(&self) -> &str {
        PROVIDER_ID
    }

    async fn detect(&self, spec: &ProviderSpec) -> DetectResult {
        let binary = resolve_binary(spec, ENV_VAR);
        probe_binary(&binary, "--version").await
    }

    fn build_invocation(
        &self,
        task: &Task,
        resolved_binary: &PathBuf,
        constraints: &PathConstraints,
    ) -> Result<Invocation, InvocationError> {
        if constraints.enforcement_mode == EnforcementMode::Strict
            && !constraints.target_paths.is_empty()
            && constraints.target_paths != [task.repo_path.clone()]
        {
            return Err(InvocationError {
                provider_id: PROVIDER_ID.to_string(),
                detail: "codex has no per-path allowlist flag; cannot scope writes under strict enforcement".to_string(),
            });
        }

        let mut args = vec!["exec".to_string(), "-C".to_string(), task.repo_path.display().to_string()];
        if task.mode == Mode::Review {
            args.push("--json".to_string());
        }

        Ok(Invocation {
            program: resolved_binary.clone(),
            args,
            env: BTreeMap::new(),
            stdin: Some(task.prompt.clone()),
            working_dir: task.repo_path.clone(),
        })
    }

    fn parse(&self, task: &Task, output: AdapterOutput) -> ParseOutcome {
        match task.mode {
            Mode::Review => ParseOutcome::Findings(parse_findings_fallback(&output.stdout)),
            Mode::Run => {
                let trimmed = output.stdout.trim();
                if trimmed.is_empty() {
                    ParseOutcome::Unparseable {
                        detail: "empty stdout from codex".to_string(),
                    }
                } else {
                    ParseOutcome::Summary(trimmed.to_string())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mco_core::Policy;

    fn task_with(constraints: PathConstraints) -> Task {
        Task::new(
            "t1",
            Mode::Review,
            "review this diff",
            PathBuf::from("/repo"),
            vec!["codex".to_string()],
            Policy::default(),
            constraints,
        )
    }

    #[test]
    fn prompt_is_written_to_stdin_not_argv() {
        let adapter = CodexAdapter;
        let constraints = PathConstraints::default();
        let task = task_with(constraints.clone());
        let invocation = adapter
            .build_invocation(&task, &PathBuf::from("codex"), &constraints)
            .unwrap();
        assert_eq!(invocation.stdin.as_deref(), Some("review this diff"));
        assert!(!invocation.args.iter().any(|a| a == "review this diff"));
    }

    #[test]
    fn strict_mode_with_narrow_target_path_is_unmet() {
        let adapter = CodexAdapter;
        let constraints = PathConstraints {
            allow_paths: vec![],
            target_paths: vec![PathBuf::from("/repo/src/only_this_dir")],
            enforcement_mode: EnforcementMode::Strict,
        };
        let task = task_with(constraints.clone());
        let result = adapter.build_invocation(&task, &PathBuf::from("codex"), &constraints);
        assert!(result.is_err());
    }
}
