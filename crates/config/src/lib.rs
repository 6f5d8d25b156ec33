//! Orchestrator-wide configuration.
//!
//! A single [`Options`] value is constructed once at startup (from a TOML
//! file, environment overrides, or both) and handed by reference to every
//! other crate. There is no module-level mutable configuration state
//! anywhere else in the workspace.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Per-model LLM pricing, dollars per million tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPrice {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

/// Categories for which a [`FixStrategy`](https://docs.rs/issues) must require human approval
/// regardless of what the LLM proposed.
pub const DEFAULT_APPROVAL_CATEGORIES: &[&str] = &["security", "authentication", "database"];

/// Top-level orchestrator configuration. All fields have sane defaults so
/// `Options::default()` is usable directly in tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Daily cost limit in USD before the cost tracker stops admitting work.
    pub daily_cost_limit: f64,
    /// Maximum number of fix-sessions that may be non-terminal, non-queued at once.
    pub max_concurrent_fixes: usize,
    /// Wall-clock budget for an entire fix session, in minutes.
    pub fix_timeout_minutes: u64,
    /// Shared retry budget for strategize/test cycles and CI-repair iterations.
    pub max_fix_retries: u32,
    /// Whether the `deploy` stage runs at all.
    pub auto_deploy_enabled: bool,
    /// Issue categories that always require approval, independent of the LLM's answer.
    pub require_approval_categories: Vec<String>,
    /// Categories/severities that are auto-approved even if otherwise flagged.
    pub auto_approve_categories: Vec<String>,
    pub auto_approve_severities: Vec<String>,
    /// Per-operation hourly rate-limit caps.
    pub rate_limits: HashMap<String, u32>,
    /// Per-model dollar pricing.
    pub llm_prices: HashMap<String, ModelPrice>,
    /// Local path to the working copy the engine operates on.
    pub repository_path: String,
    /// Default branch name pulled before creating a fix branch.
    pub default_branch: String,
    /// Branch name prefix, e.g. `fix/`.
    pub branch_prefix: String,
    /// Interval between CI polls, in seconds.
    pub ci_poll_interval_secs: u64,
    /// Total time budget for one CI poll cycle, in seconds.
    pub ci_poll_timeout_secs: u64,
    /// Health-check URL polled after a deploy.
    pub health_check_url: Option<String>,
    /// Wall-clock budget for a deploy's health check, in seconds.
    pub deploy_timeout_secs: u64,
    /// Wall-clock budget for an approval request, in seconds.
    pub approval_timeout_secs: u64,
    /// Number of lessons injected into a strategize prompt.
    pub max_lessons_per_prompt: usize,
    /// Fuzzy-match acceptance threshold for the anchored-replacement editor.
    pub editor_fuzzy_threshold: f64,
    /// Model id the engine asks for when a stage doesn't request a
    /// specific one; also the key used to look up that call's price.
    pub llm_default_model: String,
    /// How long a stalled session (budget exhausted or rate-limited)
    /// waits before the dispatcher re-enqueues it, in seconds.
    pub budget_stall_backoff_secs: u64,
}

impl Default for Options {
    fn default() -> Self {
        let mut rate_limits = HashMap::new();
        rate_limits.insert("llm_query".to_string(), 100);
        rate_limits.insert("commit".to_string(), 20);
        rate_limits.insert("file_write".to_string(), 50);
        rate_limits.insert("deploy".to_string(), 5);
        rate_limits.insert("pr_create".to_string(), 10);

        let mut llm_prices = HashMap::new();
        llm_prices.insert(
            "claude-opus-4-5-20251101".to_string(),
            ModelPrice {
                input_per_million: 15.0,
                output_per_million: 75.0,
            },
        );
        llm_prices.insert(
            "claude-sonnet-4-5-20250929".to_string(),
            ModelPrice {
                input_per_million: 3.0,
                output_per_million: 15.0,
            },
        );
        llm_prices.insert(
            "claude-3-5-haiku-20241022".to_string(),
            ModelPrice {
                input_per_million: 0.8,
                output_per_million: 4.0,
            },
        );

        Self {
            daily_cost_limit: 50.0,
            max_concurrent_fixes: 3,
            fix_timeout_minutes: 60,
            max_fix_retries: 3,
            auto_deploy_enabled: false,
            require_approval_categories: DEFAULT_APPROVAL_CATEGORIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            auto_approve_categories: Vec::new(),
            auto_approve_severities: Vec::new(),
            rate_limits,
            llm_prices,
            repository_path: ".".to_string(),
            default_branch: "main".to_string(),
            branch_prefix: "fix/".to_string(),
            ci_poll_interval_secs: 15,
            ci_poll_timeout_secs: 15 * 60,
            health_check_url: None,
            deploy_timeout_secs: 90,
            approval_timeout_secs: 30 * 60,
            max_lessons_per_prompt: 5,
            editor_fuzzy_threshold: 0.85,
            llm_default_model: "claude-sonnet-4-5-20250929".to_string(),
            budget_stall_backoff_secs: 300,
        }
    }
}

impl Options {
    /// Load configuration from a TOML file, falling back to defaults for any
    /// field the file omits (`#[serde(default)]` on every field).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let options: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        options.validate()?;
        Ok(options)
    }

    /// Load configuration from a TOML file if present, then apply a small
    /// set of environment variable overrides on top.
    pub fn load(path: Option<impl AsRef<Path>>) -> Result<Self, ConfigError> {
        let mut options = match path {
            Some(p) if p.as_ref().exists() => Self::from_file(p)?,
            _ => Self::default(),
        };
        options.apply_env_overrides();
        options.validate()?;
        Ok(options)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ORCHESTRATOR_DAILY_COST_LIMIT") {
            if let Ok(v) = v.parse() {
                self.daily_cost_limit = v;
            }
        }
        if let Ok(v) = std::env::var("ORCHESTRATOR_MAX_CONCURRENT_FIXES") {
            if let Ok(v) = v.parse() {
                self.max_concurrent_fixes = v;
            }
        }
        if let Ok(v) = std::env::var("ORCHESTRATOR_AUTO_DEPLOY") {
            self.auto_deploy_enabled = v.eq_ignore_ascii_case("true") || v == "1";
        }
        if let Ok(v) = std::env::var("ORCHESTRATOR_REPOSITORY_PATH") {
            self.repository_path = v;
        }
        if let Ok(v) = std::env::var("ORCHESTRATOR_HEALTH_CHECK_URL") {
            self.health_check_url = Some(v);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_fixes == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_fixes must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.editor_fuzzy_threshold) {
            return Err(ConfigError::Invalid(
                "editor_fuzzy_threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn fix_timeout(&self) -> Duration {
        Duration::from_secs(self.fix_timeout_minutes * 60)
    }

    #[must_use]
    pub fn ci_poll_interval(&self) -> Duration {
        Duration::from_secs(self.ci_poll_interval_secs)
    }

    #[must_use]
    pub fn ci_poll_timeout(&self) -> Duration {
        Duration::from_secs(self.ci_poll_timeout_secs)
    }

    #[must_use]
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }

    #[must_use]
    pub fn deploy_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy_timeout_secs)
    }

    #[must_use]
    pub fn budget_stall_backoff(&self) -> Duration {
        Duration::from_secs(self.budget_stall_backoff_secs)
    }

    /// Rate limit cap for a named operation, falling back to a conservative
    /// default for operations not present in the table.
    #[must_use]
    pub fn rate_limit_for(&self, operation: &str) -> u32 {
        self.rate_limits.get(operation).copied().unwrap_or(10)
    }

    #[must_use]
    pub fn price_for(&self, model: &str) -> ModelPrice {
        self.llm_prices
            .get(model)
            .cloned()
            .unwrap_or(ModelPrice {
                input_per_million: 3.0,
                output_per_million: 15.0,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let options = Options::default();
        assert!(options.validate().is_ok());
        assert_eq!(options.max_concurrent_fixes, 3);
        assert_eq!(options.rate_limit_for("llm_query"), 100);
        assert_eq!(options.rate_limit_for("unknown_op"), 10);
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut options = Options::default();
        options.max_concurrent_fixes = 0;
        assert!(options.validate().is_err());
    }

    #[test]
    fn loads_partial_toml_with_defaults() {
        let toml_text = r#"
            daily_cost_limit = 5.0
            max_concurrent_fixes = 1
        "#;
        let options: Options = toml::from_str(toml_text).unwrap();
        assert_eq!(options.daily_cost_limit, 5.0);
        assert_eq!(options.max_concurrent_fixes, 1);
        assert_eq!(options.default_branch, "main");
    }
}
