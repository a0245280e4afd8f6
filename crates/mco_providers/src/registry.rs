use std::collections::BTreeMap;
use std::sync::Arc;

use mco_core::Adapter;

use crate::claude::ClaudeAdapter;
use crate::codex::CodexAdapter;
use crate::gemini::GeminiAdapter;
use crate::opencode::OpencodeAdapter;
use crate::qwen::QwenAdapter;

/// Default binary name each built-in adapter probes for when no override or
/// environment variable is configured.
pub fn default_binary_name(provider_id: &str) -> Option<&'static str> {
    match provider_id {
        "claude" => Some("claude"),
        "codex" => Some("codex"),
        "gemini" => Some("gemini"),
        "opencode" => Some("opencode"),
        "qwen" => Some("qwen"),
        _ => None,
    }
}

/// Keyed-by-provider_id registry of the built-in adapters. Callers look
/// adapters up by the id a task names in its `provider_ids` list; unknown
/// ids are the caller's responsibility to reject
/// (`MoCoError::UnknownProvider`).
#[derive(Clone)]
pub struct Registry {
    adapters: BTreeMap<String, Arc<dyn Adapter>>,
}

impl Registry {
    pub fn builtin() -> Self {
        let mut adapters: BTreeMap<String, Arc<dyn Adapter>> = BTreeMap::new();
        adapters.insert("claude".to_string(), Arc::new(ClaudeAdapter));
        adapters.insert("codex".to_string(), Arc::new(CodexAdapter));
        adapters.insert("gemini".to_string(), Arc::new(GeminiAdapter));
        adapters.insert("opencode".to_string(), Arc::new(OpencodeAdapter));
        adapters.insert("qwen".to_string(), Arc::new(QwenAdapter));
        Self { adapters }
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(provider_id).cloned()
    }

    pub fn provider_ids(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
