//! Prompt templates for the four LLM calls the fix-session engine makes:
//! classify, analyze, strategize, and the CI-repair-loop fix-it call.
//! Each returns a single string ending in the JSON-shape instruction the
//! matching `llm::json_extract` payload type expects.

use issues::Issue;
use scm::CiFailure;
use store::Lesson;

pub fn classify_prompt(issue: &Issue) -> String {
    format!(
        "You are triaging a bug report before any code is touched.\n\n\
         Title: {}\n\
         Category: {}\n\
         Severity: {:?}\n\
         Reporter: {}\n\
         Steps to reproduce:\n{}\n\
         Expected: {}\n\
         Actual: {}\n\
         Description: {}\n\n\
         Decide whether this is something an automated fix can attempt. Respond with a single JSON object:\n\
         {{\"issue_type\": \"bug\"|\"feature_request\"|\"improvement\"|\"unclear\", \
         \"can_auto_fix\": bool, \"reason\": string, \
         \"suggested_action\": \"fix\"|\"skip\"|\"request_clarification\"|\"needs_human_review\"}}",
        issue.title,
        issue.category.as_str(),
        issue.severity,
        issue.reporter,
        numbered(&issue.steps),
        issue.expected.as_deref().unwrap_or("(none given)"),
        issue.actual.as_deref().unwrap_or("(none given)"),
        issue.description,
    )
}

pub fn analyze_prompt(issue: &Issue, file_contents: &[(String, String)]) -> String {
    format!(
        "Investigate the root cause of this bug report against the repository files below.\n\n\
         Title: {}\n\
         Category: {}\n\
         Description: {}\n\
         Steps to reproduce:\n{}\n\n\
         Files:\n{}\n\n\
         Respond with a single JSON object:\n\
         {{\"root_cause\": string, \"affected_files\": [string], \"affected_functions\": [string], \
         \"complexity\": \"simple\"|\"moderate\"|\"complex\", \"risk_level\": \"low\"|\"medium\"|\"high\", \
         \"approach\": string}}",
        issue.title,
        issue.category.as_str(),
        issue.description,
        numbered(&issue.steps),
        render_files(file_contents),
    )
}

pub fn strategize_prompt(
    issue: &Issue,
    root_cause: &str,
    approach: &str,
    file_contents: &[(String, String)],
    lessons: &[Lesson],
) -> String {
    format!(
        "Plan a concrete source-code fix for this bug. You must produce at least one `edit_file` step.\n\n\
         Title: {}\n\
         Category: {}\n\
         Root cause: {}\n\
         Suggested approach: {}\n\n\
         Files:\n{}\n\n\
         Lessons from prior failed attempts on similar issues, in priority order \
         (follow these to avoid repeating past mistakes):\n{}\n\n\
         Respond with a single JSON object:\n\
         {{\"complexity\": \"simple\"|\"moderate\"|\"complex\", \"description\": string, \
         \"requires_approval\": bool, \"rollback_plan\": string, \
         \"steps\": [{{\"type\": \"edit_file\", \"file\": string, \"old_code\": string, \
         \"new_code\": string, \"description\": string}} | \
         {{\"type\": \"add_test\", \"file\": string, \"code\": string}}]}}\n\
         `old_code` must be copied verbatim from the file shown above and must be the only \
         occurrence of that text in the file; include enough surrounding context (e.g. the full \
         function signature) to make it unique.",
        issue.title,
        issue.category.as_str(),
        root_cause,
        approach,
        render_files(file_contents),
        render_lessons(lessons),
    )
}

pub fn ci_fix_prompt(failure: &CiFailure, file_snippet: Option<&str>, strategy_description: &str) -> String {
    format!(
        "A continuous-integration check failed after this fix was proposed:\n\n\
         Original fix: {strategy_description}\n\n\
         Failed check: {}\n\
         Failure kind: {:?}\n\
         Error: {}\n\
         File: {}\n\n\
         Relevant file contents:\n{}\n\n\
         Produce exactly one `edit_file` step that resolves this specific CI failure. \
         Respond with a single JSON object:\n\
         {{\"file\": string, \"old_code\": string, \"new_code\": string, \"description\": string}}",
        failure.check_name,
        failure.kind,
        failure.error_message,
        failure.file_path.as_deref().unwrap_or("(unknown)"),
        file_snippet.unwrap_or("(file not available)"),
    )
}

fn numbered(steps: &[String]) -> String {
    if steps.is_empty() {
        return "(none given)".to_string();
    }
    steps
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {s}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_files(file_contents: &[(String, String)]) -> String {
    if file_contents.is_empty() {
        return "(no files available)".to_string();
    }
    file_contents
        .iter()
        .map(|(path, contents)| format!("--- {path} ---\n{contents}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_lessons(lessons: &[Lesson]) -> String {
    if lessons.is_empty() {
        return "(none)".to_string();
    }
    lessons
        .iter()
        .enumerate()
        .map(|(i, l)| format!("{}. {}", i + 1, l.prevention_rule))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use issues::RawIssue;

    #[test]
    fn classify_prompt_includes_title_and_steps() {
        let issue = Issue::normalize(RawIssue {
            title: Some("Login button misaligned".to_string()),
            steps: Some("1. open login\n2. look".to_string()),
            ..Default::default()
        });
        let prompt = classify_prompt(&issue);
        assert!(prompt.contains("Login button misaligned"));
        assert!(prompt.contains("1. open login"));
    }

    #[test]
    fn strategize_prompt_renders_lessons_in_order() {
        let issue = Issue::normalize(RawIssue::default());
        let lessons = vec![Lesson {
            id: 1,
            failure_type: "ambiguous_anchor".to_string(),
            root_cause: "rc".to_string(),
            lesson: "l".to_string(),
            prevention_rule: "include full function signature in old_code".to_string(),
            category: "ux".to_string(),
            files: vec![],
            times_applied: 3,
            success_count: 2,
            failure_count: 1,
            active: true,
            created_at: chrono::Utc::now(),
        }];
        let prompt = strategize_prompt(&issue, "rc", "approach", &[], &lessons);
        assert!(prompt.contains("include full function signature in old_code"));
    }
}
