/// Lifecycle of one provider's task within a run. Non-terminal variants are
/// driven by the `Runner`/`Watchdog` pair; `Dispatcher` only ever observes
/// them. Terminal variant names match the `run_state` vocabulary used in
/// artifacts and test scenarios verbatim (`exited_ok`, `cancelled_stall`,
/// etc.) so `as_str` can serialize directly into `providers/<id>.json`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RunState {
    /// Accepted by the dispatcher, waiting for a parallelism slot.
    Queued,
    /// Binary resolution and auth probing in progress.
    Detecting,
    /// `detect()` returned `detected = false`; never admitted. Terminal.
    SkippedUndetected,
    /// `build_invocation` could not satisfy a required permission under
    /// strict enforcement; never spawned. Terminal.
    PermissionUnmet,
    /// Child process spawned, argv built, stdio piped.
    Running,
    /// Cancel has been requested (stall, hard deadline, or external) but the
    /// child has not yet exited.
    Cancelling,
    /// Exited zero; output handed to the adapter's `parse`.
    Parsing,
    /// Exited zero and was parsed (even to zero findings). Terminal.
    ExitedOk,
    /// Exited non-zero. Terminal.
    ExitedErr,
    /// The OS refused to start the child. Terminal.
    SpawnFailed,
    /// Stopped by the stall watchdog. Terminal.
    CancelledStall,
    /// Stopped by the hard deadline. Terminal.
    CancelledHard,
    /// Stopped by an external interrupt. Terminal.
    CancelledExternal,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::SkippedUndetected
                | RunState::PermissionUnmet
                | RunState::ExitedOk
                | RunState::ExitedErr
                | RunState::SpawnFailed
                | RunState::CancelledStall
                | RunState::CancelledHard
                | RunState::CancelledExternal
        )
    }

    /// Whether this state reflects a provider that ran to completion without
    /// being cancelled, failing to spawn, or being skipped — the "succeeded"
    /// side of the Aggregator's precedence rules.
    pub fn is_clean_terminal(&self) -> bool {
        matches!(self, RunState::ExitedOk)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Queued => "queued",
            RunState::Detecting => "detecting",
            RunState::SkippedUndetected => "skipped_undetected",
            RunState::PermissionUnmet => "permission_unmet",
            RunState::Running => "running",
            RunState::Cancelling => "cancelling",
            RunState::Parsing => "parsing",
            RunState::ExitedOk => "exited_ok",
            RunState::ExitedErr => "exited_err",
            RunState::SpawnFailed => "spawn_failed",
            RunState::CancelledStall => "cancelled_stall",
            RunState::CancelledHard => "cancelled_hard",
            RunState::CancelledExternal => "cancelled_external",
        }
    }
}
