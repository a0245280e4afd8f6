use std::collections::BTreeMap;
use std::path::PathBuf;

use time::OffsetDateTime;

/// Review looks for findings; run executes a free-form task and returns prose.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Mode {
    Review,
    Run,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Review => "review",
            Mode::Run => "run",
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum EnforcementMode {
    Strict,
    Lenient,
}

impl Default for EnforcementMode {
    fn default() -> Self {
        EnforcementMode::Lenient
    }
}

/// Restricts which paths a provider may read or modify. Enforcement of the
/// constraint is an adapter concern (translated into CLI flags); MCO itself
/// only carries and exposes the constraint.
#[derive(Debug, Clone, Default)]
pub struct PathConstraints {
    pub allow_paths: Vec<PathBuf>,
    pub target_paths: Vec<PathBuf>,
    pub enforcement_mode: EnforcementMode,
}

/// Free-form per-provider permission options, passed through to the adapter
/// unexamined by the core.
pub type PermissionOptions = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct Policy {
    pub stall_timeout_seconds: u64,
    pub review_hard_timeout_seconds: u64,
    pub max_provider_parallelism: usize,
    pub enforcement_mode: EnforcementMode,
    pub provider_timeouts: BTreeMap<String, u64>,
    pub provider_permissions: BTreeMap<String, PermissionOptions>,
    /// Grace period between a cancel signal and a forced kill, exposed here
    /// so the CLI can override the default without hardcoding it twice.
    pub cancel_grace_seconds: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            stall_timeout_seconds: 900,
            review_hard_timeout_seconds: 0,
            max_provider_parallelism: 0,
            enforcement_mode: EnforcementMode::Lenient,
            provider_timeouts: BTreeMap::new(),
            provider_permissions: BTreeMap::new(),
            cancel_grace_seconds: 10,
        }
    }
}

impl Policy {
    /// Effective stall window for a given provider: the per-provider override
    /// if set, otherwise the policy-wide default.
    pub fn stall_window_seconds(&self, provider_id: &str) -> u64 {
        self.provider_timeouts
            .get(provider_id)
            .copied()
            .unwrap_or(self.stall_timeout_seconds)
    }

    pub fn permissions_for(&self, provider_id: &str) -> PermissionOptions {
        self.provider_permissions
            .get(provider_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Discovered, immutable-after-detect description of one provider.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub id: String,
    pub binary_name: String,
    /// Pins a non-`PATH` binary, e.g. from `mco.json`'s `providers` entries.
    pub binary_override: Option<PathBuf>,
    pub detected: bool,
    pub auth_ok: bool,
}

impl ProviderSpec {
    pub fn new(id: impl Into<String>, binary_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            binary_name: binary_name.into(),
            binary_override: None,
            detected: false,
            auth_ok: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Task {
    pub task_id: String,
    pub mode: Mode,
    pub prompt: String,
    pub repo_path: PathBuf,
    pub provider_ids: Vec<String>,
    pub policy: Policy,
    pub path_constraints: PathConstraints,
    pub created_at: OffsetDateTime,
}

impl Task {
    pub fn new(
        task_id: impl Into<String>,
        mode: Mode,
        prompt: impl Into<String>,
        repo_path: PathBuf,
        provider_ids: Vec<String>,
        policy: Policy,
        path_constraints: PathConstraints,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            mode,
            prompt: prompt.into(),
            repo_path,
            provider_ids,
            policy,
            path_constraints,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}
