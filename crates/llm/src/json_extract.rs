//! Engine-side JSON extraction from free-form LLM completions: locate the
//! outermost JSON value, tolerate markdown fences around it, repair an
//! obviously truncated trailing brace, then deserialize into one of the
//! four structure-specific payload types the fix-session engine expects.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no JSON object or array found in response")]
    NotFound,
    #[error("failed to parse extracted JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Strip surrounding markdown code fences (```json ... ``` or ``` ... ```),
/// then locate the first top-level `{...}` or `[...]` span by bracket
/// depth, ignoring brackets inside string literals.
#[must_use]
pub fn extract_json_span(text: &str) -> Option<&str> {
    let trimmed = strip_fences(text);
    let bytes = trimmed.as_bytes();

    let open_idx = bytes.iter().position(|b| *b == b'{' || *b == b'[')?;
    let open = bytes[open_idx];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open_idx) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&trimmed[open_idx..=i]);
                }
            }
            _ => {}
        }
    }

    // Truncated response: depth never returned to zero. Repair by
    // appending the missing closers and returning the rest of the text.
    if depth > 0 {
        return Some(&trimmed[open_idx..]);
    }
    None
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let after_open = after_open
        .strip_prefix("json")
        .or_else(|| after_open.strip_prefix("JSON"))
        .unwrap_or(after_open);
    let after_open = after_open.trim_start_matches('\n');
    after_open.strip_suffix("```").unwrap_or(after_open).trim()
}

/// Parse `text` as a `T`, repairing a truncated trailing brace/bracket by
/// appending the right number of closers before giving up.
pub fn extract<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, ExtractError> {
    let span = extract_json_span(text).ok_or(ExtractError::NotFound)?;
    match serde_json::from_str(span) {
        Ok(value) => Ok(value),
        Err(_) => {
            let repaired = repair_truncated(span);
            Ok(serde_json::from_str(&repaired)?)
        }
    }
}

fn repair_truncated(span: &str) -> String {
    let mut depth_curly = 0i32;
    let mut depth_square = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for b in span.bytes() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth_curly += 1,
            b'}' => depth_curly -= 1,
            b'[' => depth_square += 1,
            b']' => depth_square -= 1,
            _ => {}
        }
    }

    let mut repaired = span.to_string();
    if in_string {
        repaired.push('"');
    }
    for _ in 0..depth_square.max(0) {
        repaired.push(']');
    }
    for _ in 0..depth_curly.max(0) {
        repaired.push('}');
    }
    repaired
}

/// Output of the `classify` stage: whether an issue is auto-fixable at
/// all, before any planning work is spent on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationPayload {
    pub issue_type: String,
    pub can_auto_fix: bool,
    pub reason: String,
    pub suggested_action: String,
}

impl Default for ClassificationPayload {
    fn default() -> Self {
        Self {
            issue_type: "bug".to_string(),
            can_auto_fix: true,
            reason: String::new(),
            suggested_action: "fix".to_string(),
        }
    }
}

/// Output of the `analyze_and_learn` failure-analysis prompt.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisPayload {
    pub failure_type: String,
    pub root_cause: String,
    pub lesson: String,
    pub prevention_rule: String,
}

/// Output of the `analyze` stage: what's actually wrong and what a fix
/// will need to touch, distinct from the failure-analysis `AnalysisPayload`
/// used by the lesson store.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IssueAnalysisPayload {
    pub root_cause: String,
    pub affected_files: Vec<String>,
    pub affected_functions: Vec<String>,
    pub complexity: String,
    pub risk_level: String,
    pub approach: String,
}

/// Output of the `strategize` stage, deserialized into a loose payload
/// before validation builds a `FixStrategy`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StrategyPayload {
    pub complexity: String,
    pub description: String,
    pub requires_approval: bool,
    pub rollback_plan: String,
    pub steps: Vec<StrategyStepPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StrategyStepPayload {
    #[serde(rename = "type")]
    pub step_type: String,
    pub file: String,
    pub old_code: Option<String>,
    pub new_code: Option<String>,
    pub code: Option<String>,
    pub description: String,
}

/// Output of a CI-repair-loop fix-it prompt: exactly one `edit_file` step.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CiFixPayload {
    pub file: String,
    pub old_code: String,
    pub new_code: String,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_ignoring_surrounding_prose() {
        let text = "Sure, here's the classification:\n{\"issue_type\":\"bug\",\"can_auto_fix\":true,\"reason\":\"clear repro\",\"suggested_action\":\"fix\"}\nLet me know if you need more.";
        let payload: ClassificationPayload = extract(text).unwrap();
        assert_eq!(payload.issue_type, "bug");
        assert!(payload.can_auto_fix);
    }

    #[test]
    fn strips_markdown_fences() {
        let text = "```json\n{\"issue_type\":\"feature_request\",\"can_auto_fix\":false,\"reason\":\"not a bug\",\"suggested_action\":\"skip\"}\n```";
        let payload: ClassificationPayload = extract(text).unwrap();
        assert_eq!(payload.suggested_action, "skip");
    }

    #[test]
    fn repairs_truncated_trailing_brace() {
        let text = "{\"issue_type\":\"bug\",\"can_auto_fix\":true,\"reason\":\"clear\",\"suggested_action\":\"fix\"";
        let payload: ClassificationPayload = extract(text).unwrap();
        assert_eq!(payload.issue_type, "bug");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let payload: ClassificationPayload = extract("{}").unwrap();
        assert_eq!(payload.issue_type, "bug");
        assert!(payload.can_auto_fix);
        assert_eq!(payload.suggested_action, "fix");
    }

    #[test]
    fn returns_not_found_when_no_json_present() {
        let result: Result<ClassificationPayload, _> = extract("no json here at all");
        assert!(matches!(result, Err(ExtractError::NotFound)));
    }

    #[test]
    fn extracts_issue_analysis_payload() {
        let text = r#"{"root_cause":"off-by-one in pagination","affected_files":["src/page.rs"],"affected_functions":["next_page"],"complexity":"low","risk_level":"low","approach":"fix boundary check"}"#;
        let payload: IssueAnalysisPayload = extract(text).unwrap();
        assert_eq!(payload.root_cause, "off-by-one in pagination");
        assert_eq!(payload.affected_files, vec!["src/page.rs".to_string()]);
    }
}
