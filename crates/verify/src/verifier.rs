//! Subprocess test/format/lint runner, grounded on the teacher's
//! `ClippyErrors`/`PrChecks` "shell out, capture stdout/stderr, parse"
//! pattern but running locally against a checked-out repo rather than
//! polling GitHub check runs.

use std::path::Path;
use std::process::Stdio;

use issues::WorkerError;
use tokio::process::Command;

/// Commands to run for each verification step. A `None` slot is a step
/// this deployment explicitly never runs — most notably `typecheck`,
/// which §4.2's `test` stage disables outright rather than running it and
/// ignoring the result.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    pub test_command: Vec<String>,
    pub format_command: Vec<String>,
    pub lint_command: Vec<String>,
    pub typecheck_command: Option<Vec<String>>,
}

impl VerifyConfig {
    /// Derive the formatter's write-mode invocation from its check-mode
    /// one (`format_command`), by dropping the `--check`/`-check` flag.
    /// Used by the CI-repair loop's trivial formatter-pass repair; never
    /// invoked by `run`, which only ever checks.
    #[must_use]
    pub fn format_fix_command(&self) -> Vec<String> {
        self.format_command
            .iter()
            .filter(|arg| *arg != "--check" && *arg != "-check")
            .cloned()
            .collect()
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            test_command: vec!["cargo".to_string(), "test".to_string()],
            format_command: vec!["cargo".to_string(), "fmt".to_string(), "--check".to_string()],
            lint_command: vec!["cargo".to_string(), "clippy".to_string(), "--".to_string(), "-D".to_string(), "warnings".to_string()],
            typecheck_command: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub passed: bool,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub tests: StepResult,
    pub format: StepResult,
    pub lint: StepResult,
}

impl VerifyReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.tests.passed && self.format.passed && self.lint.passed
    }
}

#[derive(Debug, Clone, Default)]
pub struct Verifier {
    config: VerifyConfig,
}

impl Verifier {
    #[must_use]
    pub fn new(config: VerifyConfig) -> Self {
        Self { config }
    }

    /// The formatter's write-mode invocation, for the CI-repair loop's
    /// trivial formatter-pass repair.
    #[must_use]
    pub fn format_fix_command(&self) -> Vec<String> {
        self.config.format_fix_command()
    }

    pub async fn run(&self, repo_path: &Path) -> Result<VerifyReport, WorkerError> {
        let tests = Self::run_step(repo_path, &self.config.test_command).await?;
        let format = Self::run_step(repo_path, &self.config.format_command).await?;
        let lint = Self::run_step(repo_path, &self.config.lint_command).await?;

        // typecheck_command is intentionally never invoked; disabling it is
        // an explicit `test`-stage edge case, not an oversight.

        Ok(VerifyReport { tests, format, lint })
    }

    async fn run_step(repo_path: &Path, command: &[String]) -> Result<StepResult, WorkerError> {
        let Some((program, args)) = command.split_first() else {
            return Ok(StepResult {
                passed: true,
                output: String::new(),
            });
        };

        let output = Command::new(program)
            .args(args)
            .current_dir(repo_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(StepResult {
            passed: output.status.success(),
            output: combined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn succeeding_commands_produce_a_passing_report() {
        let config = VerifyConfig {
            test_command: vec!["true".to_string()],
            format_command: vec!["true".to_string()],
            lint_command: vec!["true".to_string()],
            typecheck_command: None,
        };
        let verifier = Verifier::new(config);
        let report = verifier.run(Path::new(".")).await.unwrap();
        assert!(report.all_passed());
    }

    #[tokio::test]
    async fn a_single_failing_step_fails_the_whole_report() {
        let config = VerifyConfig {
            test_command: vec!["false".to_string()],
            format_command: vec!["true".to_string()],
            lint_command: vec!["true".to_string()],
            typecheck_command: None,
        };
        let verifier = Verifier::new(config);
        let report = verifier.run(Path::new(".")).await.unwrap();
        assert!(!report.all_passed());
        assert!(!report.tests.passed);
        assert!(report.format.passed);
    }
}
