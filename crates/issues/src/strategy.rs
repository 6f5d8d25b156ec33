//! `FixStrategy`: the LLM's plan for resolving an [`crate::Issue`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Category;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StrategyError {
    #[error("strategy has no edit_file steps")]
    NoEditSteps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    /// Coerce a loosely-typed LLM answer into a `Complexity`, the same way
    /// [`crate::Severity::from_loose`] coerces an issue's severity:
    /// unrecognized text falls back to the middle value rather than
    /// rejecting the whole strategy over one malformed field.
    #[must_use]
    pub fn from_loose(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "simple" | "low" => Self::Simple,
            "complex" | "high" => Self::Complex,
            _ => Self::Moderate,
        }
    }
}

/// One step of a [`FixStrategy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FixStep {
    EditFile {
        file: String,
        old_code: String,
        new_code: String,
        description: String,
    },
    AddTest {
        file: String,
        code: String,
    },
}

impl FixStep {
    #[must_use]
    pub fn file(&self) -> &str {
        match self {
            Self::EditFile { file, .. } | Self::AddTest { file, .. } => file,
        }
    }

    #[must_use]
    pub fn is_edit_file(&self) -> bool {
        matches!(self, Self::EditFile { .. })
    }
}

/// The LLM's plan for resolving an issue, produced by the `strategize`
/// stage and consumed by `implement`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixStrategy {
    pub complexity: Complexity,
    pub description: String,
    pub files_affected: Vec<String>,
    pub requires_approval: bool,
    pub steps: Vec<FixStep>,
    pub rollback_plan: String,
}

impl FixStrategy {
    /// Construct a strategy, rejecting it if it contains no `edit_file`
    /// steps (§3 invariant: "a strategy must contain at least one
    /// `edit_file` step").
    pub fn new(
        complexity: Complexity,
        description: impl Into<String>,
        steps: Vec<FixStep>,
        requires_approval: bool,
        rollback_plan: impl Into<String>,
    ) -> Result<Self, StrategyError> {
        if !steps.iter().any(FixStep::is_edit_file) {
            return Err(StrategyError::NoEditSteps);
        }

        let mut files_affected = Vec::new();
        for step in &steps {
            let file = step.file().to_string();
            if !files_affected.contains(&file) {
                files_affected.push(file);
            }
        }

        Ok(Self {
            complexity,
            description: description.into(),
            files_affected,
            requires_approval,
            steps,
            rollback_plan: rollback_plan.into(),
        })
    }

    /// Force `requires_approval` on for categories the approval gate never
    /// lets the LLM opt out of (§4.2's `strategize` contract).
    pub fn force_approval_for_category(&mut self, category: Category) {
        if category.always_requires_approval() {
            self.requires_approval = true;
        }
    }

    #[must_use]
    pub fn edit_steps(&self) -> Vec<&FixStep> {
        self.steps.iter().filter(|s| s.is_edit_file()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complexity_from_loose_falls_back_to_moderate() {
        assert_eq!(Complexity::from_loose("simple"), Complexity::Simple);
        assert_eq!(Complexity::from_loose("HIGH"), Complexity::Complex);
        assert_eq!(Complexity::from_loose("unclear"), Complexity::Moderate);
    }

    #[test]
    fn rejects_strategy_with_only_add_test_steps() {
        let result = FixStrategy::new(
            Complexity::Simple,
            "add coverage",
            vec![FixStep::AddTest {
                file: "tests/a.rs".to_string(),
                code: "#[test] fn a() {}".to_string(),
            }],
            false,
            "none",
        );
        assert_eq!(result.unwrap_err(), StrategyError::NoEditSteps);
    }

    #[test]
    fn accepts_strategy_with_one_edit_step() {
        let strategy = FixStrategy::new(
            Complexity::Simple,
            "fix alignment",
            vec![FixStep::EditFile {
                file: "templates/login.hbs".to_string(),
                old_code: "class=\"btn\"".to_string(),
                new_code: "class=\"btn btn-centered\"".to_string(),
                description: "center button".to_string(),
            }],
            false,
            "revert the class change",
        )
        .unwrap();
        assert_eq!(strategy.files_affected, vec!["templates/login.hbs"]);
    }

    #[test]
    fn forces_approval_for_security_category() {
        let mut strategy = FixStrategy::new(
            Complexity::Simple,
            "patch auth check",
            vec![FixStep::EditFile {
                file: "src/auth.rs".to_string(),
                old_code: "if true".to_string(),
                new_code: "if is_valid(token)".to_string(),
                description: "validate token".to_string(),
            }],
            false,
            "revert",
        )
        .unwrap();
        strategy.force_approval_for_category(Category::Security);
        assert!(strategy.requires_approval);
    }
}
