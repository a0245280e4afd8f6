use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use mco_core::{
    Adapter, AdapterOutput, DetectResult, EnforcementMode, Invocation, InvocationError, Mode,
    ParseOutcome, PathConstraints, ProviderSpec, Task,
};

use crate::common::{probe_binary, resolve_binary};
use crate::findings::parse_findings_fallback;

const PROVIDER_ID: &str = "opencode";
const ENV_VAR: &str = "OPENCODE_BINARY";

/// Adapter for the OpenCode CLI's `run` subcommand. OpenCode's
/// non-interactive mode takes the prompt as a positional argument and
/// restricts its working tree only via the process cwd, with no per-path
/// allowlist flag of its own — same shape as Codex, so strict enforcement
/// with a target path narrower than the repo root reports
/// `PermissionUnmet`.
#[derive(Debug, Default)]
pub struct OpencodeAdapter;

#[async_trait]
impl Adapter for OpencodeAdapter {
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
                detail: "opencode has no per-path allowlist flag; cannot scope writes under strict enforcement".to_string(),
            });
        }

        let mut args = vec!["run".to_string(), task.prompt.clone()];
        if task.mode == Mode::Review {
            args.push("--print-logs".to_string());
        }

        Ok(Invocation {
            program: resolved_binary.clone(),
            args,
            env: BTreeMap::new(),
            stdin: None,
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
                        detail: "empty stdout from opencode".to_string(),
                    }
                } else {
                    ParseOutcome::Summary(trimmed.to_string())
                }
            }
        }
    }
}
