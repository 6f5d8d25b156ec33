//! Issue model, loose-input normalization, and the `FixStrategy` produced
//! by the planning stage of a fix session.

pub mod extract;
pub mod strategy;
pub mod worker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use strategy::{Complexity, FixStep, FixStrategy, StrategyError};
pub use worker::{WorkerError, WorkerResult};

/// Severity of a reported issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn from_loose(value: Option<&str>) -> Self {
        match value.map(str::to_lowercase).as_deref() {
            Some("low") => Self::Low,
            Some("high") => Self::High,
            Some("critical") => Self::Critical,
            _ => Self::Medium,
        }
    }

    #[must_use]
    pub fn is_high_or_critical(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

/// Category of a reported issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Ux,
    Performance,
    Bug,
    Security,
    Accessibility,
    Authentication,
    Database,
    Other,
}

impl Category {
    #[must_use]
    pub fn from_loose(value: Option<&str>) -> Self {
        match value.map(str::to_lowercase).as_deref() {
            Some("ux") => Self::Ux,
            Some("performance") => Self::Performance,
            Some("security") => Self::Security,
            Some("accessibility") => Self::Accessibility,
            Some("authentication") => Self::Authentication,
            Some("database") => Self::Database,
            Some("other") => Self::Other,
            Some("bug") => Self::Bug,
            _ => Self::Bug,
        }
    }

    /// Categories that always force `requires_approval = true` on a strategy.
    #[must_use]
    pub fn always_requires_approval(self) -> bool {
        matches!(self, Self::Security | Self::Authentication | Self::Database)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ux => "ux",
            Self::Performance => "performance",
            Self::Bug => "bug",
            Self::Security => "security",
            Self::Accessibility => "accessibility",
            Self::Authentication => "authentication",
            Self::Database => "database",
            Self::Other => "other",
        }
    }
}

/// A normalized bug report, immutable once accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub category: Category,
    pub reporter: String,
    pub steps: Vec<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Loosely-shaped input as it arrives from the issue source: every field
/// optional, strings not yet coerced into enums.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawIssue {
    pub title: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub category: Option<String>,
    pub reporter: Option<String>,
    /// Free-form steps, either newline-delimited or a numbered list.
    pub steps: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

/// Split a free-form steps block into an ordered sequence, stripping
/// leading list numbering (`"1. "`, `"1) "`) and blank lines.
#[must_use]
pub fn normalize_steps(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(strip_list_marker)
        .collect()
}

fn strip_list_marker(line: &str) -> String {
    let trimmed = line.trim_start();
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    if digits_end > 0 {
        let rest = &trimmed[digits_end..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest.trim().to_string();
        }
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim().to_string();
        }
    }
    if let Some(rest) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
        return rest.trim().to_string();
    }
    trimmed.to_string()
}

impl Issue {
    /// Normalize a loosely-shaped [`RawIssue`] into a well-formed [`Issue`],
    /// coercing unrecognized severity/category into defensible defaults.
    #[must_use]
    pub fn normalize(raw: RawIssue) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: raw
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Unknown Issue".to_string()),
            description: raw.description.unwrap_or_default(),
            severity: Severity::from_loose(raw.severity.as_deref()),
            category: Category::from_loose(raw.category.as_deref()),
            reporter: raw.reporter.unwrap_or_else(|| "unknown".to_string()),
            steps: normalize_steps(raw.steps.as_deref()),
            expected: raw.expected.filter(|s| !s.trim().is_empty()),
            actual: raw.actual.filter(|s| !s.trim().is_empty()),
            created_at: Utc::now(),
        }
    }

    /// File paths heuristically referenced by the issue's description, via
    /// [`extract::extract_file_references`].
    #[must_use]
    pub fn referenced_files(&self) -> Vec<String> {
        extract::extract_file_references(&self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_unknown_severity_and_category() {
        let raw = RawIssue {
            title: Some("Thing broke".to_string()),
            severity: Some("URGENT".to_string()),
            category: Some("whatever".to_string()),
            ..Default::default()
        };
        let issue = Issue::normalize(raw);
        assert_eq!(issue.severity, Severity::Medium);
        assert_eq!(issue.category, Category::Bug);
    }

    #[test]
    fn defaults_missing_title() {
        let issue = Issue::normalize(RawIssue::default());
        assert_eq!(issue.title, "Unknown Issue");
        assert!(issue.steps.is_empty());
        assert!(issue.expected.is_none());
    }

    #[test]
    fn normalizes_numbered_steps() {
        let raw = RawIssue {
            steps: Some("1. Open login page\n2. Tap submit\n3. Observe crash".to_string()),
            ..Default::default()
        };
        let issue = Issue::normalize(raw);
        assert_eq!(
            issue.steps,
            vec!["Open login page", "Tap submit", "Observe crash"]
        );
    }

    #[test]
    fn normalizes_newline_steps_without_numbers() {
        let raw = RawIssue {
            steps: Some("open the app\n\nobserve button".to_string()),
            ..Default::default()
        };
        let issue = Issue::normalize(raw);
        assert_eq!(issue.steps, vec!["open the app", "observe button"]);
    }

    #[test]
    fn security_category_always_requires_approval() {
        assert!(Category::Security.always_requires_approval());
        assert!(Category::Authentication.always_requires_approval());
        assert!(Category::Database.always_requires_approval());
        assert!(!Category::Ux.always_requires_approval());
    }
}
