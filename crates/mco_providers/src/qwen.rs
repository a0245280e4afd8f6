use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use mco_core::{
    Adapter, AdapterOutput, DetectResult, Invocation, InvocationError, Mode, ParseOutcome,
    PathConstraints, ProviderSpec, Task,
};

use crate::common::{probe_binary, resolve_binary};
use crate::findings::parse_findings_fallback;

const PROVIDER_ID: &str = "qwen";
const ENV_VAR: &str = "QWEN_BINARY";

/// Adapter for the Qwen Code CLI. Same single-prompt, non-interactive,
/// JSON-capable shape as Gemini's; Qwen also accepts `--include-directories`
/// for path scoping, same as Gemini's.
#[derive(Debug, Default)]
pub struct QwenAdapter;

#[async_trait]
impl Adapter for QwenAdapter {
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
        let mut args = vec!["-p".to_string(), task.prompt.clone()];

        if task.mode == Mode::Review {
            args.push("--output-format".to_string());
            args.push("json".to_string());
        }

        if !constraints.allow_paths.is_empty() {
            let joined = constraints
                .allow_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(",");
            args.push("--include-directories".to_string());
            args.push(joined);
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
                        detail: "empty stdout from qwen".to_string(),
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
    use mco_core::{EnforcementMode, Policy};

    #[test]
    fn review_mode_requests_json_output() {
        let adapter = QwenAdapter;
        let constraints = PathConstraints {
            allow_paths: vec![],
            target_paths: vec![],
            enforcement_mode: EnforcementMode::Lenient,
        };
        let task = Task::new(
            "t1",
            Mode::Review,
            "review",
            PathBuf::from("/repo"),
            vec![PROVIDER_ID.to_string()],
            Policy::default(),
            constraints.clone(),
        );
        let invocation = adapter
            .build_invocation(&task, &PathBuf::from("qwen"), &constraints)
            .unwrap();
        assert!(invocation.args.contains(&"--output-format".to_string()));
    }
}
