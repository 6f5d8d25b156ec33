//! `ApprovalGate`: decides whether a strategy needs a human sign-off before
//! `implement` runs.

use issues::{Category, Complexity, FixStrategy, Issue, Severity};

const SENSITIVE_PATTERNS: &[&str] = &[
    "auth",
    "password",
    "token",
    "secret",
    "credential",
    "migration",
    "schema",
    "database",
];

pub struct ApprovalGate;

impl ApprovalGate {
    /// Evaluate the five OR'd conditions that force human approval,
    /// returning the first one that applies alongside a human-readable
    /// reason.
    #[must_use]
    pub fn needs_approval(issue: &Issue, strategy: &FixStrategy) -> (bool, String) {
        if matches!(
            issue.category,
            Category::Security | Category::Authentication | Category::Database
        ) {
            return (true, format!("category '{}' always requires approval", issue.category.as_str()));
        }

        if matches!(issue.severity, Severity::Critical | Severity::High) {
            return (true, "severity is high or critical".to_string());
        }

        if matches!(strategy.complexity, Complexity::Complex) {
            return (true, "strategy complexity is complex".to_string());
        }

        if let Some(file) = strategy
            .files_affected
            .iter()
            .find(|f| matches_sensitive_pattern(f))
        {
            return (true, format!("affected file '{file}' matches a sensitive pattern"));
        }

        if strategy.requires_approval {
            return (true, "strategy requested approval".to_string());
        }

        (false, String::new())
    }
}

fn matches_sensitive_pattern(file: &str) -> bool {
    let lower = file.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use issues::{Complexity, FixStep, RawIssue};

    fn benign_strategy() -> FixStrategy {
        FixStrategy::new(
            Complexity::Simple,
            "center the button",
            vec![FixStep::EditFile {
                file: "templates/login.hbs".to_string(),
                old_code: "class=\"btn\"".to_string(),
                new_code: "class=\"btn btn-centered\"".to_string(),
                description: "center button".to_string(),
            }],
            false,
            "revert",
        )
        .unwrap()
    }

    #[test]
    fn security_category_forces_approval() {
        let issue = Issue::normalize(RawIssue {
            category: Some("security".to_string()),
            ..Default::default()
        });
        let (needs, reason) = ApprovalGate::needs_approval(&issue, &benign_strategy());
        assert!(needs);
        assert!(reason.contains("category"));
    }

    #[test]
    fn sensitive_file_forces_approval_even_for_benign_category() {
        let issue = Issue::normalize(RawIssue {
            category: Some("ux".to_string()),
            ..Default::default()
        });
        let strategy = FixStrategy::new(
            Complexity::Simple,
            "bump token expiry",
            vec![FixStep::EditFile {
                file: "src/auth/token_store.rs".to_string(),
                old_code: "300".to_string(),
                new_code: "600".to_string(),
                description: "extend token lifetime".to_string(),
            }],
            false,
            "revert",
        )
        .unwrap();
        let (needs, reason) = ApprovalGate::needs_approval(&issue, &strategy);
        assert!(needs);
        assert!(reason.contains("sensitive"));
    }

    #[test]
    fn benign_ux_fix_does_not_require_approval() {
        let issue = Issue::normalize(RawIssue {
            category: Some("ux".to_string()),
            severity: Some("low".to_string()),
            ..Default::default()
        });
        let (needs, _) = ApprovalGate::needs_approval(&issue, &benign_strategy());
        assert!(!needs);
    }
}
