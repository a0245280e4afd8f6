use std::path::PathBuf;

use thiserror::Error;

/// Orchestrator-internal failures: configuration parse failure, filesystem
/// unwritable, and the like. These abort the run before fan-out and surface
/// as process exit 70 — distinct from [`ErrorKind`], which is per-provider
/// data that never aborts anything.
#[derive(Debug, Error)]
pub enum MoCoError {
    #[error("repo path {path:?} does not exist or is not a directory")]
    InvalidRepoPath { path: PathBuf },

    #[error("no providers requested")]
    NoProvidersRequested,

    #[error("unknown provider id {id:?}")]
    UnknownProvider { id: String },

    #[error("failed to create artifact directory {path:?}: {source}")]
    ArtifactDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write artifact {path:?}: {source}")]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read config {path:?}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("task join failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Per-provider error classification, carried in `ProviderResult.error_kind`.
/// Recorded as data, never raised: a provider that times out or exits
/// non-zero does not abort the overall run, it just produces a
/// `ProviderResult` whose `error_kind` is set.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Binary missing on PATH (and no override resolved it either).
    NotDetected,
    /// Strict mode and an adapter-required permission could not be
    /// expressed as CLI flags for this provider.
    PermissionUnmet,
    /// The OS refused to start the child.
    SpawnFailed,
    /// Watchdog cancelled for lack of progress.
    CancelledStall,
    /// Hard deadline fired.
    CancelledHard,
    /// User interrupt.
    CancelledExternal,
    /// Child exited with non-zero status and the parser produced nothing
    /// usable.
    ExitNonzero,
    /// Child exited 0 but no findings were recovered. Review mode only;
    /// informational, not fatal.
    ParseEmpty,
    /// Bug in the orchestrator surfaced while handling this provider's
    /// runner, rather than an orchestrator-wide abort.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotDetected => "not_detected",
            ErrorKind::PermissionUnmet => "permission_unmet",
            ErrorKind::SpawnFailed => "spawn_failed",
            ErrorKind::CancelledStall => "cancelled_stall",
            ErrorKind::CancelledHard => "cancelled_hard",
            ErrorKind::CancelledExternal => "cancelled_external",
            ErrorKind::ExitNonzero => "exit_nonzero",
            ErrorKind::ParseEmpty => "parse_empty",
            ErrorKind::Internal => "internal",
        }
    }
}
