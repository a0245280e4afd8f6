use mco_core::{Finding, Severity};
use serde_json::Value;

/// Shared output-to-findings fallback chain: prefer a machine-readable mode
/// from the CLI when available, else extract fenced JSON blocks, else fall
/// back to heuristic section parsing. A provider's native JSON mode (when
/// it has one) is handled in that provider's own module, since its shape
/// is provider-specific; this module is the fenced/heuristic fallbacks,
/// shared because every adapter needs the same two once its own native
/// parse comes up empty.
pub fn parse_findings_fallback(text: &str) -> Vec<Finding> {
    if let Some(findings) = extract_fenced_json_findings(text) {
        if !findings.is_empty() {
            return findings;
        }
    }
    extract_heuristic_findings(text)
}

/// Scans for ` ```json ... ``` ` fenced code blocks and tries to parse each
/// as either `{"findings": [...]}` or a bare JSON array of finding objects.
/// Returns `None` if no fenced JSON block was found at all (distinct from
/// `Some(vec![])`, which means a block was found but contained no
/// recognizable findings).
pub fn extract_fenced_json_findings(text: &str) -> Option<Vec<Finding>> {
    let mut findings = Vec::new();
    let mut saw_block = false;

    for block in fenced_blocks(text, "json") {
        saw_block = true;
        let Ok(value) = serde_json::from_str::<Value>(&block) else {
            continue;
        };
        findings.extend(findings_from_json_value(&value));
    }

    saw_block.then_some(findings)
}

fn fenced_blocks(text: &str, lang: &str) -> Vec<String> {
    let fence_open = format!("```{lang}");
    let mut blocks = Vec::new();
    let mut lines = text.lines().peekable();
    while let Some(line) = lines.next() {
        if line.trim() != fence_open && !line.trim().eq_ignore_ascii_case(&fence_open) {
            continue;
        }
        let mut body = String::new();
        for inner in lines.by_ref() {
            if inner.trim() == "```" {
                break;
            }
            body.push_str(inner);
            body.push('\n');
        }
        blocks.push(body);
    }
    blocks
}

fn findings_from_json_value(value: &Value) -> Vec<Finding> {
    let array = match value {
        Value::Array(items) => items.clone(),
        Value::Object(obj) => match obj.get("findings") {
            Some(Value::Array(items)) => items.clone(),
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    array.iter().filter_map(finding_from_json_object).collect()
}

fn finding_from_json_object(value: &Value) -> Option<Finding> {
    let obj = value.as_object()?;
    let severity = obj
        .get("severity")
        .and_then(Value::as_str)
        .and_then(parse_severity)
        .unwrap_or(Severity::Info);
    let category = obj
        .get("category")
        .and_then(Value::as_str)
        .unwrap_or("uncategorized")
        .to_string();
    let title = obj.get("title").and_then(Value::as_str)?.to_string();
    let mut finding = Finding::new(severity, category, title);
    finding.evidence = obj
        .get("evidence")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    finding.recommendation = obj
        .get("recommendation")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(finding)
}

/// Heuristic last resort: interprets `## <severity>: <title>` (or `## [severity] title`)
/// markdown headings as finding boundaries, with everything up to the next
/// heading (or a `Recommendation:` line within the section) as evidence.
pub fn extract_heuristic_findings(text: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut current: Option<Finding> = None;
    let mut evidence = String::new();

    for line in text.lines() {
        if let Some((severity, title)) = parse_heading(line) {
            if let Some(mut finding) = current.take() {
                finding.evidence = evidence.trim().to_string();
                findings.push(finding);
            }
            evidence = String::new();
            current = Some(Finding::new(severity, "uncategorized", title));
            continue;
        }

        if current.is_none() {
            continue;
        }

        if let Some(rest) = line.trim_start().strip_prefix("Recommendation:") {
            if let Some(finding) = current.as_mut() {
                finding.recommendation = rest.trim().to_string();
            }
            continue;
        }

        if !line.trim().is_empty() {
            evidence.push_str(line.trim());
            evidence.push('\n');
        }
    }

    if let Some(mut finding) = current.take() {
        finding.evidence = evidence.trim().to_string();
        findings.push(finding);
    }

    findings
}

fn parse_heading(line: &str) -> Option<(Severity, String)> {
    let rest = line.trim().strip_prefix("## ")?;

    if let Some((tag, title)) = rest.split_once(':') {
        if let Some(severity) = parse_severity(tag.trim()) {
            return Some((severity, title.trim().to_string()));
        }
    }

    if let Some(rest) = rest.strip_prefix('[') {
        if let Some((tag, title)) = rest.split_once(']') {
            if let Some(severity) = parse_severity(tag.trim()) {
                return Some((severity, title.trim().to_string()));
            }
        }
    }

    None
}

/// Case-insensitive severity tag parsing, shared by every adapter's native
/// JSON parser as well as the fenced/heuristic fallbacks here.
pub fn parse_severity(raw: &str) -> Option<Severity> {
    match raw.to_ascii_lowercase().as_str() {
        "critical" => Some(Severity::Critical),
        "high" => Some(Severity::High),
        "medium" => Some(Severity::Medium),
        "low" => Some(Severity::Low),
        "info" | "informational" => Some(Severity::Info),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_findings_array_from_fenced_json() {
        let text = "Here is my review:\n```json\n{\"findings\":[{\"severity\":\"high\",\"category\":\"security\",\"title\":\"sqli\",\"evidence\":\"db.rs:42\",\"recommendation\":\"use a prepared statement\"}]}\n```\nDone.";
        let findings = extract_fenced_json_findings(text).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].title, "sqli");
    }

    #[test]
    fn bare_array_fence_is_also_accepted() {
        let text = "```json\n[{\"severity\":\"low\",\"title\":\"nit\"}]\n```";
        let findings = extract_fenced_json_findings(text).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Low);
    }

    #[test]
    fn no_fence_returns_none() {
        assert!(extract_fenced_json_findings("just prose, no fences").is_none());
    }

    #[test]
    fn heuristic_headings_become_findings_with_evidence_and_recommendation() {
        let text = "\
## critical: SQL injection in query builder
User input is concatenated directly into the query string.
Recommendation: use parameterized queries.

## low: inconsistent naming
Some functions use camelCase.
";
        let findings = extract_heuristic_findings(text);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].recommendation, "use parameterized queries.");
        assert_eq!(findings[1].severity, Severity::Low);
    }

    #[test]
    fn fallback_chain_prefers_fenced_json_over_heuristic() {
        let text = "## critical: ignored heading\n```json\n{\"findings\":[{\"severity\":\"medium\",\"title\":\"from json\"}]}\n```";
        let findings = parse_findings_fallback(text);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].title, "from json");
    }
}
