use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// One normalized review observation. Shape is provider-agnostic: adapters
/// are responsible for mapping whatever a given CLI emits (native JSON,
/// fenced markdown, heuristic headings) into this; `provider_id` and, when
/// the adapter didn't supply one, `ordinal` are injected by the Normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub provider_id: String,
    pub ordinal: u32,
    pub severity: Severity,
    pub category: String,
    pub title: String,
    pub evidence: String,
    pub recommendation: String,
}

impl Finding {
    pub fn new(severity: Severity, category: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            provider_id: String::new(),
            ordinal: 0,
            severity,
            category: category.into(),
            title: title.into(),
            evidence: String::new(),
            recommendation: String::new(),
        }
    }
}
