use crate::finding::Severity;
use crate::result::{Decision, ProviderResult};
use crate::state::RunState;
use crate::task::Mode;

/// Pure aggregation function: same inputs always produce the same decision.
/// Review mode applies a five-rule precedence ladder; run mode applies a
/// simpler three-way rule. In both, the first matching rule wins.
pub fn decide(mode: Mode, provider_results: &[ProviderResult]) -> Decision {
    match mode {
        Mode::Review => decide_review(provider_results),
        Mode::Run => decide_run(provider_results),
    }
}

fn decide_review(results: &[ProviderResult]) -> Decision {
    let any_critical = results
        .iter()
        .flat_map(|r| r.findings.iter())
        .any(|f| f.severity == Severity::Critical);
    if any_critical {
        return Decision::Fail;
    }

    let any_clean = results.iter().any(|r| r.run_state.is_clean_terminal());
    if !any_clean {
        return Decision::Fail;
    }

    // Narrower than "not clean": a provider that was killed by the caller
    // (`cancelled_external`) or blocked by path policy (`permission_unmet`)
    // doesn't, on its own, demote a review with findings from every other
    // provider down to PARTIAL.
    let any_failed = results.iter().any(|r| {
        matches!(
            r.run_state,
            RunState::CancelledStall
                | RunState::CancelledHard
                | RunState::SpawnFailed
                | RunState::ExitedErr
                | RunState::SkippedUndetected
        )
    });
    if any_failed {
        return Decision::Partial;
    }

    let any_high = results
        .iter()
        .flat_map(|r| r.findings.iter())
        .any(|f| f.severity == Severity::High);
    if any_high {
        return Decision::Escalate;
    }

    Decision::Pass
}

fn decide_run(results: &[ProviderResult]) -> Decision {
    let succeeded = results
        .iter()
        .filter(|r| r.run_state.is_clean_terminal())
        .count();
    if succeeded == 0 {
        Decision::Fail
    } else if succeeded == results.len() {
        Decision::Pass
    } else {
        Decision::Partial
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::error::ErrorKind;
    use crate::finding::Finding;
    use crate::state::RunState;

    fn base(provider_id: &str, run_state: RunState) -> ProviderResult {
        let now = OffsetDateTime::now_utc();
        ProviderResult {
            provider_id: provider_id.to_string(),
            run_state,
            error_kind: None,
            auth_ok: true,
            findings: Vec::new(),
            summary: None,
            exit_code: Some(0),
            started_at: now,
            finished_at: now,
            truncated: false,
            stdout_text: String::new(),
            stderr_text: String::new(),
        }
    }

    #[test]
    fn happy_path_two_high_findings_escalates() {
        let mut claude = base("claude", RunState::ExitedOk);
        claude
            .findings
            .push(Finding::new(Severity::High, "style", "nit"));
        let mut codex = base("codex", RunState::ExitedOk);
        codex
            .findings
            .push(Finding::new(Severity::High, "style", "nit"));

        assert_eq!(decide(Mode::Review, &[claude, codex]), Decision::Escalate);
    }

    #[test]
    fn one_stalls_is_partial() {
        let claude = base("claude", RunState::ExitedOk);
        let mut codex = base("codex", RunState::CancelledStall);
        codex.error_kind = Some(ErrorKind::CancelledStall);

        assert_eq!(decide(Mode::Review, &[claude, codex]), Decision::Partial);
    }

    #[test]
    fn undetected_with_clean_sibling_is_partial() {
        let claude = base("claude", RunState::ExitedOk);
        let mut qwen = base("qwen", RunState::SkippedUndetected);
        qwen.error_kind = Some(ErrorKind::NotDetected);
        qwen.auth_ok = false;

        assert_eq!(decide(Mode::Review, &[claude, qwen]), Decision::Partial);
    }

    #[test]
    fn critical_finding_overrides_everything() {
        let mut a = base("claude", RunState::ExitedOk);
        a.findings
            .push(Finding::new(Severity::Critical, "security", "sqli"));
        let mut b = base("codex", RunState::ExitedOk);
        b.findings
            .push(Finding::new(Severity::Low, "style", "nit"));
        let c = base("gemini", RunState::SpawnFailed);

        assert_eq!(decide(Mode::Review, &[a, b, c]), Decision::Fail);
    }

    #[test]
    fn none_clean_is_fail() {
        let a = base("claude", RunState::CancelledHard);
        let b = base("codex", RunState::SpawnFailed);
        assert_eq!(decide(Mode::Review, &[a, b]), Decision::Fail);
    }

    #[test]
    fn clean_run_with_no_findings_passes() {
        let a = base("claude", RunState::ExitedOk);
        let b = base("codex", RunState::ExitedOk);
        assert_eq!(decide(Mode::Review, &[a, b]), Decision::Pass);
    }

    #[test]
    fn run_mode_partial_success() {
        let a = base("claude", RunState::ExitedOk);
        let b = base("codex", RunState::ExitedErr);
        assert_eq!(decide(Mode::Run, &[a, b]), Decision::Partial);
    }

    #[test]
    fn run_mode_all_succeed_passes() {
        let a = base("claude", RunState::ExitedOk);
        let b = base("codex", RunState::ExitedOk);
        assert_eq!(decide(Mode::Run, &[a, b]), Decision::Pass);
    }

    #[test]
    fn run_mode_none_succeed_fails() {
        let a = base("claude", RunState::SpawnFailed);
        assert_eq!(decide(Mode::Run, &[a]), Decision::Fail);
    }
}
