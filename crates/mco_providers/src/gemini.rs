use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use mco_core::{
    Adapter, AdapterOutput, DetectResult, Invocation, InvocationError, Mode, ParseOutcome,
    PathConstraints, ProviderSpec, Task,
};

use crate::common::{probe_binary, resolve_binary};
use crate::findings::parse_findings_fallback;

const PROVIDER_ID: &str = "gemini";
const ENV_VAR: &str = "GEMINI_BINARY";

/// Adapter for the Gemini CLI: single-prompt, non-interactive, JSON-capable,
/// the same shape as Claude's. `--include-directories` is Gemini's analogue
/// of Claude's `--add-dir`, so strict-mode path scoping is always
/// satisfiable here.
#[derive(Debug, Default)]
pub struct GeminiAdapter;

#[async_trait]
impl Adapter for GeminiAdapter {
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
                        detail: "empty stdout from gemini".to_string(),
                    }
                } else {
                    ParseOutcome::Summary(trimmed.to_string())
                }
            }
        }
    }
}
