use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::ErrorKind;
use crate::finding::Finding;
use crate::task::{PathConstraints, ProviderSpec, Task};

/// Outcome of `Adapter::detect`. A provider that is not detected is never
/// admitted (`ProviderResult.error_kind = NotDetected`); one that is
/// detected but fails an auth probe is still admitted — `auth_ok = false`
/// is only recorded for diagnostics, and the actual failure (if any) is
/// left to surface through `parse` or a non-zero exit.
#[derive(Debug, Clone)]
pub enum DetectResult {
    Detected {
        resolved_binary: PathBuf,
        auth_ok: bool,
    },
    NotDetected,
}

/// A fully-built subprocess invocation, ready for the `Runner` to spawn.
/// Adapters are responsible for translating a `Task`'s prompt and policy
/// into provider-specific argv/env/stdin; the `Runner` never inspects the
/// provider identity.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Written to the child's stdin and then closed, when the provider's CLI
    /// expects the prompt that way rather than as an argument.
    pub stdin: Option<String>,
    pub working_dir: PathBuf,
}

/// Raised by `build_invocation` when a requested permission or path
/// constraint has no safe translation for this provider's CLI (e.g. a
/// provider with no flag to restrict writes to an allowlist under strict
/// enforcement). The dispatcher treats this the same as a detect failure:
/// it never reaches the `Runner`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{provider_id}: cannot satisfy permission constraint: {detail}")]
pub struct InvocationError {
    pub provider_id: String,
    pub detail: String,
}

/// Raw completion data handed from the `Runner` to `Adapter::parse`.
#[derive(Debug, Clone)]
pub struct AdapterOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub truncated: bool,
}

/// Result of parsing a completed provider's captured output.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    /// Review mode: zero or more findings extracted.
    Findings(Vec<Finding>),
    /// Run mode: free-form prose summary.
    Summary(String),
    /// Output didn't fit any of the adapter's fallback strategies.
    Unparseable { detail: String },
}

/// Uniform contract every provider plugs into: detect a binary once, build
/// one invocation per task, parse one completed run's output.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn provider_id(&self) -> &str;

    async fn detect(&self, spec: &ProviderSpec) -> DetectResult;

    fn build_invocation(
        &self,
        task: &Task,
        resolved_binary: &PathBuf,
        constraints: &PathConstraints,
    ) -> Result<Invocation, InvocationError>;

    fn parse(&self, task: &Task, output: AdapterOutput) -> ParseOutcome;

    /// Maps a raw, non-cancelled process exit into an [`ErrorKind`]. Most
    /// adapters can rely on the default: zero is success, anything else is
    /// `ExitNonzero`. Exits following a cancellation are classified by the
    /// `Runner`/`Watchdog`, not here.
    fn classify_exit(&self, exit_code: Option<i32>) -> Option<ErrorKind> {
        match exit_code {
            Some(0) => None,
            _ => Some(ErrorKind::ExitNonzero),
        }
    }
}
