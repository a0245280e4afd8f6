use time::OffsetDateTime;

use crate::error::ErrorKind;
use crate::finding::{Finding, Severity};
use crate::state::RunState;

/// Outcome of a single provider's task, regardless of mode. A provider that
/// failed has `error_kind` set and empty `findings`/`summary`; one that
/// completed has `error_kind = None` (review mode: `ParseEmpty` is the one
/// exception — it sets `error_kind` even though the provider exited zero).
#[derive(Debug, Clone)]
pub struct ProviderResult {
    pub provider_id: String,
    pub run_state: RunState,
    pub error_kind: Option<ErrorKind>,
    pub auth_ok: bool,
    pub findings: Vec<Finding>,
    pub summary: Option<String>,
    pub exit_code: Option<i32>,
    pub started_at: OffsetDateTime,
    pub finished_at: OffsetDateTime,
    pub truncated: bool,
    /// Captured stdout/stderr, up to the runner's capture budget. Carried on
    /// the result (rather than left inside the now-dropped `OutputBuffer`)
    /// so the artifact writer can flush `raw/<id>.stdout`/`.stderr` without
    /// the aggregator needing to know about runner internals.
    pub stdout_text: String,
    pub stderr_text: String,
}

/// The run's final disposition, derived by `aggregate::decide` from every
/// provider's `ProviderResult`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Decision {
    Pass,
    Fail,
    Escalate,
    Partial,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Pass => "PASS",
            Decision::Fail => "FAIL",
            Decision::Escalate => "ESCALATE",
            Decision::Partial => "PARTIAL",
        }
    }

    /// Process exit code this decision maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            Decision::Pass => 0,
            Decision::Fail => 1,
            Decision::Escalate => 2,
            Decision::Partial => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub task_id: String,
    pub decision: Decision,
    pub provider_results: Vec<ProviderResult>,
    pub started_at: OffsetDateTime,
    pub finished_at: OffsetDateTime,
}

impl RunResult {
    /// Findings from every provider, in canonical provider-list order.
    pub fn all_findings(&self) -> Vec<&Finding> {
        self.provider_results
            .iter()
            .flat_map(|r| r.findings.iter())
            .collect()
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.all_findings().into_iter().map(|f| f.severity).max()
    }
}
