use std::io::Write;
use std::path::{Path, PathBuf};

use mco_core::{ErrorKind, Finding, MoCoError, ProviderResult, RunResult, Task};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Writes one `<artifact_base>/<task_id>/` tree: `summary.md`,
/// `decision.md`, `findings.json` (review mode only), `run.json`,
/// `providers/<id>.json`, `raw/<id>.stdout`, `raw/<id>.stderr`. Every file
/// is written atomically (write-to-temp + rename).
pub fn write_run(artifact_base: &Path, task: &Task, result: &RunResult) -> Result<PathBuf, MoCoError> {
    let task_dir = artifact_base.join(&task.task_id);
    let providers_dir = task_dir.join("providers");
    let raw_dir = task_dir.join("raw");

    for dir in [&task_dir, &providers_dir, &raw_dir] {
        std::fs::create_dir_all(dir).map_err(|source| MoCoError::ArtifactDir {
            path: dir.clone(),
            source,
        })?;
    }

    write_atomic(&task_dir, "run.json", serde_json::to_vec_pretty(&run_result_json(task, result)).unwrap().as_slice())?;

    if task.mode == mco_core::Mode::Review {
        let findings_doc = json!({ "findings": result.all_findings().iter().map(|f| finding_json(f)).collect::<Vec<_>>() });
        write_atomic(&task_dir, "findings.json", serde_json::to_vec_pretty(&findings_doc).unwrap().as_slice())?;
    }

    write_atomic(&task_dir, "decision.md", format!("{}\n", result.decision.as_str()).as_bytes())?;
    write_atomic(&task_dir, "summary.md", render_summary(task, result).as_bytes())?;

    for provider in &result.provider_results {
        let filename = format!("{}.json", provider.provider_id);
        write_atomic(&providers_dir, &filename, serde_json::to_vec_pretty(&provider_result_json(provider)).unwrap().as_slice())?;

        write_atomic(&raw_dir, &format!("{}.stdout", provider.provider_id), raw_bytes(&provider.stdout_text, provider.truncated).as_slice())?;
        write_atomic(&raw_dir, &format!("{}.stderr", provider.provider_id), raw_bytes(&provider.stderr_text, provider.truncated).as_slice())?;
    }

    Ok(task_dir)
}

/// Appends a truncation marker to a raw stream dump when the runner's
/// capture budget was exceeded, since the byte counter itself (the source
/// of truth for progress) isn't part of the artifact.
fn raw_bytes(text: &str, truncated: bool) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    if truncated {
        bytes.extend_from_slice(b"\n...[truncated: capture budget exceeded]\n");
    }
    bytes
}

fn write_atomic(dir: &Path, filename: &str, contents: &[u8]) -> Result<(), MoCoError> {
    let dest = dir.join(filename);
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| MoCoError::ArtifactWrite {
        path: dest.clone(),
        source,
    })?;
    tmp.write_all(contents).map_err(|source| MoCoError::ArtifactWrite {
        path: dest.clone(),
        source,
    })?;
    tmp.persist(&dest).map_err(|e| MoCoError::ArtifactWrite {
        path: dest.clone(),
        source: e.error,
    })?;
    Ok(())
}

fn format_time(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_default()
}

fn finding_json(f: &Finding) -> Value {
    serde_json::to_value(f).unwrap_or(Value::Null)
}

fn error_kind_json(kind: Option<ErrorKind>) -> Value {
    match kind {
        Some(kind) => Value::String(kind.as_str().to_string()),
        None => Value::Null,
    }
}

fn provider_result_json(r: &ProviderResult) -> Value {
    json!({
        "provider_id": r.provider_id,
        "run_state": r.run_state.as_str(),
        "error_kind": error_kind_json(r.error_kind),
        "auth_ok": r.auth_ok,
        "exit_code": r.exit_code,
        "started_at": format_time(r.started_at),
        "ended_at": format_time(r.finished_at),
        "duration_seconds": (r.finished_at - r.started_at).whole_seconds(),
        "truncated": r.truncated,
        "findings": r.findings.iter().map(finding_json).collect::<Vec<_>>(),
        "summary": r.summary,
    })
}

/// The full `RunResult` document, shared between the artifact writer
/// (`run.json`) and the CLI's `--result-mode stdout|both` / `--json` paths
/// so both surfaces emit the identical document.
pub fn run_result_json(task: &Task, r: &RunResult) -> Value {
    let mut provider_results = serde_json::Map::new();
    for provider in &r.provider_results {
        provider_results.insert(provider.provider_id.clone(), provider_result_json(provider));
    }

    json!({
        "task_id": r.task_id,
        "mode": task.mode.as_str(),
        "started_at": format_time(r.started_at),
        "ended_at": format_time(r.finished_at),
        "duration_seconds": (r.finished_at - r.started_at).whole_seconds(),
        "decision": r.decision.as_str(),
        "provider_results": provider_results,
        "findings": r.all_findings().iter().map(|f| finding_json(f)).collect::<Vec<_>>(),
    })
}

fn render_summary(task: &Task, r: &RunResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("# MCO run {}\n\n", r.task_id));
    out.push_str(&format!("mode: {}\n", task.mode.as_str()));
    out.push_str(&format!("decision: {}\n\n", r.decision.as_str()));
    out.push_str("| provider | run_state | error_kind | findings |\n");
    out.push_str("|---|---|---|---|\n");
    for provider in &r.provider_results {
        let error = provider.error_kind.map(|e| e.as_str()).unwrap_or("-");
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            provider.provider_id,
            provider.run_state.as_str(),
            error,
            provider.findings.len(),
        ));
    }
    out
}

/// Reserved `state_file` write: last-run metadata only, never read back by
/// the core.
pub fn write_state_file(state_path: &Path, task: &Task, r: &RunResult) -> Result<(), MoCoError> {
    if let Some(parent) = state_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| MoCoError::ArtifactDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    let doc = json!({
        "task_id": r.task_id,
        "mode": task.mode.as_str(),
        "decision": r.decision.as_str(),
        "ended_at": format_time(r.finished_at),
    });
    let parent = state_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let filename = state_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state.json".to_string());
    write_atomic(parent, &filename, serde_json::to_vec_pretty(&doc).unwrap().as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mco_core::{Decision, EnforcementMode, Mode, PathConstraints, Policy, RunState, Severity};
    use std::path::PathBuf;

    fn provider_result(id: &str, run_state: RunState, findings: Vec<Finding>) -> ProviderResult {
        let now = OffsetDateTime::now_utc();
        ProviderResult {
            provider_id: id.to_string(),
            run_state,
            error_kind: None,
            auth_ok: true,
            findings,
            summary: None,
            exit_code: Some(0),
            started_at: now,
            finished_at: now,
            truncated: false,
            stdout_text: "ok\n".to_string(),
            stderr_text: String::new(),
        }
    }

    fn task() -> Task {
        Task::new(
            "20260101-000000-aaaa",
            Mode::Review,
            "review this diff",
            PathBuf::from("/repo"),
            vec!["claude".to_string(), "codex".to_string()],
            Policy::default(),
            PathConstraints {
                allow_paths: vec![],
                target_paths: vec![],
                enforcement_mode: EnforcementMode::Lenient,
            },
        )
    }

    #[test]
    fn writes_the_full_artifact_tree() {
        let dir = tempfile::tempdir().unwrap();
        let task = task();
        let mut claude = provider_result("claude", RunState::ExitedOk, vec![Finding::new(Severity::High, "security", "x")]);
        claude.findings[0].provider_id = "claude".to_string();
        let codex = provider_result("codex", RunState::ExitedOk, vec![]);
        let now = OffsetDateTime::now_utc();
        let result = RunResult {
            task_id: task.task_id.clone(),
            decision: Decision::Escalate,
            provider_results: vec![claude, codex],
            started_at: now,
            finished_at: now,
        };

        let task_dir = write_run(dir.path(), &task, &result).unwrap();
        assert!(task_dir.join("run.json").is_file());
        assert!(task_dir.join("decision.md").is_file());
        assert!(task_dir.join("summary.md").is_file());
        assert!(task_dir.join("findings.json").is_file());
        assert!(task_dir.join("providers/claude.json").is_file());
        assert!(task_dir.join("providers/codex.json").is_file());
        assert!(task_dir.join("raw/claude.stdout").is_file());
        assert!(task_dir.join("raw/claude.stderr").is_file());

        let decision_contents = std::fs::read_to_string(task_dir.join("decision.md")).unwrap();
        assert_eq!(decision_contents.trim(), "ESCALATE");

        let findings_doc: Value = serde_json::from_str(
            &std::fs::read_to_string(task_dir.join("findings.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(findings_doc["findings"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn run_mode_omits_findings_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut task = task();
        task.mode = Mode::Run;
        let now = OffsetDateTime::now_utc();
        let result = RunResult {
            task_id: task.task_id.clone(),
            decision: Decision::Pass,
            provider_results: vec![provider_result("claude", RunState::ExitedOk, vec![])],
            started_at: now,
            finished_at: now,
        };

        let task_dir = write_run(dir.path(), &task, &result).unwrap();
        assert!(!task_dir.join("findings.json").exists());
    }

    #[test]
    fn truncated_stream_gets_a_marker_appended() {
        let mut result = provider_result("qwen", RunState::ExitedOk, vec![]);
        result.truncated = true;
        let bytes = raw_bytes(&result.stdout_text, result.truncated);
        assert!(String::from_utf8(bytes).unwrap().contains("truncated"));
    }
}
