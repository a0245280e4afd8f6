use time::OffsetDateTime;

use crate::adapter::ParseOutcome;
use crate::error::ErrorKind;
use crate::finding::Finding;
use crate::result::ProviderResult;
use crate::state::RunState;

/// Wraps one completed runner's parsed output into a `ProviderResult`,
/// tagging every finding with its `provider_id` and a stable per-finding
/// ordinal. Stateless: a fresh `Normalizer` per runner is free, there is
/// nothing to share across providers.
pub struct Normalizer {
    provider_id: String,
}

impl Normalizer {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
        }
    }

    /// Builds the terminal `ProviderResult` for a runner that reached
    /// `run_state` with `outcome` already parsed from its captured output.
    /// `exit_code`/`truncated`/`auth_ok` are passed through from the
    /// `Runner`/detect step unchanged.
    #[allow(clippy::too_many_arguments)]
    pub fn finalize(
        &self,
        run_state: RunState,
        outcome: Option<ParseOutcome>,
        exit_code: Option<i32>,
        auth_ok: bool,
        truncated: bool,
        started_at: OffsetDateTime,
        finished_at: OffsetDateTime,
        stdout_text: String,
        stderr_text: String,
    ) -> ProviderResult {
        // The run_state itself (spawn failure, any of the three cancel
        // reasons, non-zero exit) always takes precedence over whatever the
        // adapter's parser produced — a cancelled runner's output still gets
        // fed to `parse` per the termination-to-normalizer data flow, but a
        // finding recovered from a half-written transcript doesn't make the
        // run any less cancelled.
        let state_error_kind = self.error_kind_for_terminal_state(run_state);

        let (findings, summary, parse_error_kind) = match outcome {
            Some(ParseOutcome::Findings(raw)) => {
                let tagged = self.tag_findings(raw);
                let error_kind = if tagged.is_empty() {
                    Some(ErrorKind::ParseEmpty)
                } else {
                    None
                };
                (tagged, None, error_kind)
            }
            Some(ParseOutcome::Summary(text)) => (Vec::new(), Some(text), None),
            Some(ParseOutcome::Unparseable { detail }) => {
                (Vec::new(), Some(detail), Some(ErrorKind::ParseEmpty))
            }
            None => (Vec::new(), None, None),
        };

        let error_kind = state_error_kind.or(parse_error_kind);

        ProviderResult {
            provider_id: self.provider_id.clone(),
            run_state,
            error_kind,
            auth_ok,
            findings,
            summary,
            exit_code,
            started_at,
            finished_at,
            truncated,
            stdout_text,
            stderr_text,
        }
    }

    fn tag_findings(&self, findings: Vec<Finding>) -> Vec<Finding> {
        findings
            .into_iter()
            .enumerate()
            .map(|(i, mut f)| {
                f.provider_id = self.provider_id.clone();
                f.ordinal = i as u32;
                truncate_title(&mut f.title);
                f
            })
            .collect()
    }

    fn error_kind_for_terminal_state(&self, run_state: RunState) -> Option<ErrorKind> {
        match run_state {
            RunState::SkippedUndetected => Some(ErrorKind::NotDetected),
            RunState::PermissionUnmet => Some(ErrorKind::PermissionUnmet),
            RunState::SpawnFailed => Some(ErrorKind::SpawnFailed),
            RunState::CancelledStall => Some(ErrorKind::CancelledStall),
            RunState::CancelledHard => Some(ErrorKind::CancelledHard),
            RunState::CancelledExternal => Some(ErrorKind::CancelledExternal),
            RunState::ExitedErr => Some(ErrorKind::ExitNonzero),
            _ => None,
        }
    }
}

const MAX_TITLE_CHARS: usize = 200;

/// Clamps a finding title to `MAX_TITLE_CHARS`, cutting on a char boundary so
/// a multi-byte character never gets split.
fn truncate_title(title: &mut String) {
    if title.chars().count() > MAX_TITLE_CHARS {
        *title = title.chars().take(MAX_TITLE_CHARS).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::Severity;

    #[test]
    fn findings_get_tagged_with_provider_and_ordinal() {
        let normalizer = Normalizer::new("claude");
        let now = OffsetDateTime::now_utc();
        let result = normalizer.finalize(
            RunState::ExitedOk,
            Some(ParseOutcome::Findings(vec![
                Finding::new(Severity::Low, "style", "a"),
                Finding::new(Severity::High, "security", "b"),
            ])),
            Some(0),
            true,
            false,
            now,
            now,
            String::new(),
            String::new(),
        );
        assert_eq!(result.findings[0].provider_id, "claude");
        assert_eq!(result.findings[0].ordinal, 0);
        assert_eq!(result.findings[1].ordinal, 1);
        assert!(result.error_kind.is_none());
    }

    #[test]
    fn zero_findings_sets_parse_empty_but_stays_review_success() {
        let normalizer = Normalizer::new("codex");
        let now = OffsetDateTime::now_utc();
        let result = normalizer.finalize(
            RunState::ExitedOk,
            Some(ParseOutcome::Findings(Vec::new())),
            Some(0),
            true,
            false,
            now,
            now,
            String::new(),
            String::new(),
        );
        assert_eq!(result.error_kind, Some(ErrorKind::ParseEmpty));
        assert_eq!(result.run_state, RunState::ExitedOk);
    }

    #[test]
    fn cancelled_stall_error_kind_overrides_partial_findings() {
        let normalizer = Normalizer::new("claude");
        let now = OffsetDateTime::now_utc();
        let result = normalizer.finalize(
            RunState::CancelledStall,
            Some(ParseOutcome::Findings(vec![Finding::new(
                Severity::Low,
                "style",
                "partial",
            )])),
            None,
            true,
            true,
            now,
            now,
            String::new(),
            String::new(),
        );
        assert_eq!(result.error_kind, Some(ErrorKind::CancelledStall));
        assert_eq!(result.findings.len(), 1);
    }

    #[test]
    fn skipped_undetected_gets_not_detected_error_kind_without_an_outcome() {
        let normalizer = Normalizer::new("qwen");
        let now = OffsetDateTime::now_utc();
        let result = normalizer.finalize(
            RunState::SkippedUndetected,
            None,
            None,
            false,
            false,
            now,
            now,
            String::new(),
            String::new(),
        );
        assert_eq!(result.error_kind, Some(ErrorKind::NotDetected));
    }
}
