use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use mco_core::{EnforcementMode, MoCoError, PermissionOptions, Policy};
use serde::Deserialize;

/// `mco.json`'s shape: `providers`, `artifact_base`, `state_file`, `policy`.
/// Every field is optional so a partial config only overrides what it
/// names; the rest falls through to [`Policy::default`]. Precedence is CLI
/// flags, then config file, then built-in defaults.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfigEntry>,
    pub artifact_base: Option<String>,
    pub state_file: Option<String>,
    #[serde(default)]
    pub policy: PolicyConfig,
}

#[derive(Debug, Deserialize)]
pub struct ProviderConfigEntry {
    pub id: String,
    pub binary: Option<PathBuf>,
    #[serde(default)]
    pub permissions: PermissionOptions,
}

#[derive(Debug, Default, Deserialize)]
pub struct PolicyConfig {
    pub stall_timeout_seconds: Option<u64>,
    pub review_hard_timeout_seconds: Option<u64>,
    pub max_provider_parallelism: Option<usize>,
    pub enforcement_mode: Option<String>,
    #[serde(default)]
    pub provider_timeouts: BTreeMap<String, u64>,
    pub cancel_grace_seconds: Option<u64>,
}

pub const DEFAULT_ARTIFACT_BASE: &str = "reports/review";
pub const DEFAULT_STATE_FILE: &str = ".mco/state.json";

impl FileConfig {
    /// Loads `path` if given, else `./mco.json` when it exists, else the
    /// all-defaults config.
    pub fn load(path: Option<&Path>) -> Result<Self, MoCoError> {
        let resolved = match path {
            Some(explicit) => Some(explicit.to_path_buf()),
            None => {
                let default_path = PathBuf::from("mco.json");
                default_path.exists().then_some(default_path)
            }
        };

        let Some(resolved) = resolved else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(&resolved).map_err(|source| MoCoError::ConfigRead {
            path: resolved.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| MoCoError::ConfigParse {
            path: resolved,
            source,
        })
    }

    pub fn artifact_base(&self) -> String {
        self.artifact_base.clone().unwrap_or_else(|| DEFAULT_ARTIFACT_BASE.to_string())
    }

    pub fn state_file(&self) -> String {
        self.state_file.clone().unwrap_or_else(|| DEFAULT_STATE_FILE.to_string())
    }

    pub fn binary_override(&self, provider_id: &str) -> Option<PathBuf> {
        self.providers
            .iter()
            .find(|p| p.id == provider_id)
            .and_then(|p| p.binary.clone())
    }

    pub fn provider_permissions(&self) -> BTreeMap<String, PermissionOptions> {
        self.providers
            .iter()
            .map(|p| (p.id.clone(), p.permissions.clone()))
            .collect()
    }
}

fn parse_enforcement_mode(value: &str) -> Option<EnforcementMode> {
    match value {
        "strict" => Some(EnforcementMode::Strict),
        "lenient" => Some(EnforcementMode::Lenient),
        _ => None,
    }
}

/// Builds the effective [`Policy`] from built-in defaults, the loaded
/// config file, and CLI overrides, in that precedence order (lowest to
/// highest — later writers win).
#[allow(clippy::too_many_arguments)]
pub fn merge_policy(
    config: &FileConfig,
    cli_stall_timeout: Option<u64>,
    cli_review_hard_timeout: Option<u64>,
    cli_max_parallelism: Option<usize>,
    cli_enforcement_mode: Option<EnforcementMode>,
) -> Policy {
    let mut policy = Policy::default();

    if let Some(v) = config.policy.stall_timeout_seconds {
        policy.stall_timeout_seconds = v;
    }
    if let Some(v) = config.policy.review_hard_timeout_seconds {
        policy.review_hard_timeout_seconds = v;
    }
    if let Some(v) = config.policy.max_provider_parallelism {
        policy.max_provider_parallelism = v;
    }
    if let Some(v) = config.policy.enforcement_mode.as_deref().and_then(parse_enforcement_mode) {
        policy.enforcement_mode = v;
    }
    if let Some(v) = config.policy.cancel_grace_seconds {
        policy.cancel_grace_seconds = v;
    }
    policy.provider_timeouts = config.policy.provider_timeouts.clone();
    policy.provider_permissions = config.provider_permissions();

    if let Some(v) = cli_stall_timeout {
        policy.stall_timeout_seconds = v;
    }
    if let Some(v) = cli_review_hard_timeout {
        policy.review_hard_timeout_seconds = v;
    }
    if let Some(v) = cli_max_parallelism {
        policy.max_provider_parallelism = v;
    }
    if let Some(v) = cli_enforcement_mode {
        policy.enforcement_mode = v;
    }

    policy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_win_over_config_which_wins_over_defaults() {
        let mut config = FileConfig::default();
        config.policy.stall_timeout_seconds = Some(120);
        config.policy.max_provider_parallelism = Some(2);

        let policy = merge_policy(&config, Some(30), None, None, None);
        assert_eq!(policy.stall_timeout_seconds, 30);
        assert_eq!(policy.max_provider_parallelism, 2);
        assert_eq!(policy.review_hard_timeout_seconds, Policy::default().review_hard_timeout_seconds);
    }

    #[test]
    fn an_explicitly_named_missing_config_file_is_an_error() {
        let err = FileConfig::load(Some(Path::new("/definitely/not/mco.json"))).unwrap_err();
        assert!(matches!(err, MoCoError::ConfigRead { .. }));
    }

    #[test]
    fn an_explicit_config_file_is_loaded_and_merged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mco.json");
        std::fs::write(
            &path,
            r#"{"artifact_base":"out/review","policy":{"stall_timeout_seconds":42}}"#,
        )
        .unwrap();

        let config = FileConfig::load(Some(&path)).unwrap();
        assert_eq!(config.artifact_base(), "out/review");
        assert_eq!(config.policy.stall_timeout_seconds, Some(42));
    }
}
