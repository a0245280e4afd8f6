use std::path::{Path, PathBuf};
use std::process::Stdio;

use mco_core::{DetectResult, ProviderSpec};
use tokio::process::Command;

/// Binary resolution order shared by every adapter: an explicit override
/// (from `mco.json`'s `providers` entries), then an environment variable
/// (`<PROVIDER>_BINARY`), then the provider's default name on `PATH`.
pub fn resolve_binary(spec: &ProviderSpec, env_var: &str) -> PathBuf {
    if let Some(override_path) = &spec.binary_override {
        return override_path.clone();
    }
    if let Ok(value) = std::env::var(env_var) {
        if !value.trim().is_empty() {
            return PathBuf::from(value);
        }
    }
    PathBuf::from(&spec.binary_name)
}

/// Probes a resolved binary by running its version flag. A failure to spawn
/// at all (binary missing) is `NotDetected`; a successful spawn is
/// `Detected`, with `auth_ok` set from the exit status as a best-effort
/// signal — most of these CLIs exit non-zero on `--version` only when
/// something deeper (like a broken install) is wrong, so this is a weak
/// auth probe. Real auth failures are expected to surface through a
/// provider's own invocation instead.
pub async fn probe_binary(binary: &Path, version_flag: &str) -> DetectResult {
    let status = Command::new(binary)
        .arg(version_flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) => DetectResult::Detected {
            resolved_binary: binary.to_path_buf(),
            auth_ok: status.success(),
        },
        Err(_) => DetectResult::NotDetected,
    }
}
