use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use mco_core::{
    Adapter, AdapterOutput, DetectResult, Invocation, InvocationError, Mode, ParseOutcome,
    PathConstraints, ProviderSpec, Task,
};
use serde_json::Value;

use crate::common::{probe_binary, resolve_binary};
use crate::findings::parse_findings_fallback;

const PROVIDER_ID: &str = "claude";
const ENV_VAR: &str = "CLAUDE_BINARY";

/// Adapter for the Claude Code CLI: `-p` for the prompt, `--output-format
/// json` in review mode, `--add-dir` for path scoping, `--allowedTools`/
/// `--model` for permission passthrough.
#[derive(Debug, Default)]
pub struct ClaudeAdapter;

#[async_trait]
impl Adapter for ClaudeAdapter {
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

        for dir in &constraints.allow_paths {
            args.push("--add-dir".to_string());
            args.push(dir.display().to_string());
        }

        if let Some(model) = task.policy.permissions_for(PROVIDER_ID).get("model") {
            args.push("--model".to_string());
            args.push(model.clone());
        }

        if let Some(tools) = task.policy.permissions_for(PROVIDER_ID).get("allowed_tools") {
            args.push("--allowedTools".to_string());
            args.push(tools.clone());
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
            Mode::Review => parse_review(&output),
            Mode::Run => parse_run(&output),
        }
    }
}

fn parse_review(output: &AdapterOutput) -> ParseOutcome {
    if let Some(findings) = native_json_findings(&output.stdout) {
        return ParseOutcome::Findings(findings);
    }
    ParseOutcome::Findings(parse_findings_fallback(&output.stdout))
}

fn parse_run(output: &AdapterOutput) -> ParseOutcome {
    if let Some(text) = native_json_summary(&output.stdout) {
        return ParseOutcome::Summary(text);
    }
    let trimmed = output.stdout.trim();
    if trimmed.is_empty() {
        ParseOutcome::Unparseable {
            detail: "empty stdout from claude".to_string(),
        }
    } else {
        ParseOutcome::Summary(trimmed.to_string())
    }
}

/// `claude --output-format json` wraps its final message in a top-level
/// `result`/`findings` object; prefer that over the fenced/heuristic
/// fallback when it parses cleanly.
fn native_json_findings(stdout: &str) -> Option<Vec<mco_core::Finding>> {
    let value: Value = serde_json::from_str(stdout.trim()).ok()?;
    let findings = value.get("findings")?.as_array()?;
    let mut out = Vec::new();
    for item in findings {
        let severity = item
            .get("severity")
            .and_then(Value::as_str)
            .and_then(crate::findings::parse_severity)
            .unwrap_or(mco_core::Severity::Info);
        let title = item.get("title").and_then(Value::as_str)?.to_string();
        let mut finding = mco_core::Finding::new(
            severity,
            item.get("category")
                .and_then(Value::as_str)
                .unwrap_or("uncategorized")
                .to_string(),
            title,
        );
        finding.evidence = item
            .get("evidence")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        finding.recommendation = item
            .get("recommendation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        out.push(finding);
    }
    Some(out)
}

fn native_json_summary(stdout: &str) -> Option<String> {
    let value: Value = serde_json::from_str(stdout.trim()).ok()?;
    value
        .get("result")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mco_core::{EnforcementMode, Policy};
    use std::path::PathBuf;

    fn task(mode: Mode) -> Task {
        Task::new(
            "t1",
            mode,
            "review this diff",
            PathBuf::from("/repo"),
            vec!["claude".to_string()],
            Policy::default(),
            PathConstraints {
                allow_paths: vec![PathBuf::from("/repo/src")],
                target_paths: vec![],
                enforcement_mode: EnforcementMode::Lenient,
            },
        )
    }

    #[test]
    fn review_mode_requests_json_output_and_scoped_dirs() {
        let adapter = ClaudeAdapter;
        let invocation = adapter
            .build_invocation(&task(Mode::Review), &PathBuf::from("claude"), &task(Mode::Review).path_constraints)
            .unwrap();
        assert!(invocation.args.contains(&"--output-format".to_string()));
        assert!(invocation.args.contains(&"/repo/src".to_string()));
    }

    #[test]
    fn native_json_findings_parsed_when_well_formed() {
        let output = AdapterOutput {
            stdout: r#"{"result":"ok","findings":[{"severity":"high","title":"x"}]}"#.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            truncated: false,
        };
        let outcome = parse_review(&output);
        match outcome {
            ParseOutcome::Findings(findings) => assert_eq!(findings.len(), 1),
            other => panic!("expected Findings, got {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_heuristic_when_stdout_is_not_json() {
        let output = AdapterOutput {
            stdout: "## high: something\nevidence here\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            truncated: false,
        };
        let outcome = parse_review(&output);
        match outcome {
            ParseOutcome::Findings(findings) => assert_eq!(findings.len(), 1),
            other => panic!("expected Findings, got {other:?}"),
        }
    }
}
