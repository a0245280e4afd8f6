mod claude;
mod codex;
mod common;
mod findings;
mod gemini;
mod opencode;
mod qwen;
mod registry;

pub use claude::ClaudeAdapter;
pub use codex::CodexAdapter;
pub use common::{probe_binary, resolve_binary};
pub use findings::{extract_fenced_json_findings, extract_heuristic_findings, parse_findings_fallback, parse_severity};
pub use gemini::GeminiAdapter;
pub use opencode::OpencodeAdapter;
pub use qwen::QwenAdapter;
pub use registry::{default_binary_name, Registry};
