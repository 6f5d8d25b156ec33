//! CI check status plumbing and log classification.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    #[default]
    Queued,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckConclusion {
    #[default]
    Pending,
    Success,
    Failure,
    Cancelled,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiCheck {
    pub name: String,
    pub status: CheckStatus,
    pub conclusion: CheckConclusion,
    pub output_summary: Option<String>,
}

impl CiCheck {
    #[must_use]
    pub fn is_failing(&self) -> bool {
        self.status == CheckStatus::Completed && self.conclusion == CheckConclusion::Failure
    }

    #[must_use]
    pub fn is_still_running(&self) -> bool {
        self.status != CheckStatus::Completed
    }
}

/// Aggregate status of a PR's checks, derived from the per-check states per
/// `ci_repair_loop` step 1: any failure wins, then any still-running check
/// with no failures is pending, else success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallStatus {
    Success,
    Pending,
    Failure,
}

/// Derive the aggregate status from a set of per-check results.
#[must_use]
pub fn overall_status(checks: &[CiCheck]) -> OverallStatus {
    if checks.iter().any(CiCheck::is_failing) {
        OverallStatus::Failure
    } else if checks.iter().any(CiCheck::is_still_running) {
        OverallStatus::Pending
    } else {
        OverallStatus::Success
    }
}

/// Kind of CI failure, as classified by [`parse_ci_logs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiFailureKind {
    /// `black --check` (or equivalent formatter) reported unformatted files.
    Formatting,
    /// `flake8`/lint step reported style or static-analysis violations.
    Linting,
    /// A test runner reported one or more failing tests.
    Test,
    /// The build/compile step itself failed.
    Build,
    /// None of the four recognizers matched; the ci-repair loop still
    /// hands the raw log to the LLM, just without a classification hint.
    Unknown,
}

/// A single structured CI failure, extracted from a check's raw log per
/// `ci_repair_loop` step 3's four recognizers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiFailure {
    pub check_name: String,
    pub kind: CiFailureKind,
    pub error_message: String,
    pub file_path: Option<String>,
    pub line_number: Option<u32>,
    pub raw_log: String,
}

static BLACK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)would reformat|black --check|\d+ files? would be reformatted").unwrap());
static BLACK_FILE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)would reformat ([\w./-]+)").unwrap());

static FLAKE8_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)flake8|[\w./]+:\d+:\d+:\s*[EWF]\d{3}\b").unwrap());
static FLAKE8_LINE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\w./-]+):(\d+):(\d+):\s*([EWF]\d{3})\s*(.*)").unwrap());

static TEST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)FAILED |AssertionError|test result: FAILED|\d+ failed(?:,|\s)|panicked at").unwrap()
});
static TEST_LINE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"FAILED ([\w./-]+)::([\w_:]+)\s*-\s*(.*)").unwrap());

static BUILD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error\[E\d+\]|error: could not compile|compilation error|build failed").unwrap());
static BUILD_LINE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ERROR[^:]*:\s*(.*)").unwrap());

/// Classifies a raw CI log into one of four recognized failure kinds, in
/// a fixed priority order (formatting, then lint, then test, then build),
/// falling back to `Unknown` when nothing matches.
#[must_use]
pub fn parse_ci_logs(logs: &str) -> CiFailureKind {
    if BLACK_PATTERN.is_match(logs) {
        CiFailureKind::Formatting
    } else if FLAKE8_PATTERN.is_match(logs) {
        CiFailureKind::Linting
    } else if TEST_PATTERN.is_match(logs) {
        CiFailureKind::Test
    } else if BUILD_PATTERN.is_match(logs) {
        CiFailureKind::Build
    } else {
        CiFailureKind::Unknown
    }
}

/// Classify a failed check's raw log into a structured [`CiFailure`],
/// extracting file/line detail where the matched recognizer carries it.
/// When a recognizer produces more than one match (e.g. several flake8
/// violations), the first is used as the summary and the full log is kept
/// in `raw_log` for the repair prompt.
#[must_use]
pub fn classify_failure(check_name: &str, logs: &str) -> CiFailure {
    let kind = parse_ci_logs(logs);
    let (error_message, file_path, line_number) = match kind {
        CiFailureKind::Formatting => {
            let file = BLACK_FILE_PATTERN
                .captures(logs)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
            ("file needs reformatting".to_string(), file, None)
        }
        CiFailureKind::Linting => {
            if let Some(caps) = FLAKE8_LINE_PATTERN.captures(logs) {
                let file = caps.get(1).map(|m| m.as_str().to_string());
                let line = caps.get(2).and_then(|m| m.as_str().parse().ok());
                let code = caps.get(4).map_or("", |m| m.as_str());
                let msg = caps.get(5).map_or("", |m| m.as_str());
                (format!("{code} {msg}").trim().to_string(), file, line)
            } else {
                ("lint violation".to_string(), None, None)
            }
        }
        CiFailureKind::Test => {
            if let Some(caps) = TEST_LINE_PATTERN.captures(logs) {
                let file = caps.get(1).map(|m| m.as_str().to_string());
                let reason = caps.get(3).map_or("test failed", |m| m.as_str());
                (reason.to_string(), file, None)
            } else {
                ("test failed".to_string(), None, None)
            }
        }
        CiFailureKind::Build => {
            let msg = BUILD_LINE_PATTERN
                .captures(logs)
                .and_then(|c| c.get(1))
                .map_or_else(|| "build failed".to_string(), |m| m.as_str().trim().to_string());
            (msg, None, None)
        }
        CiFailureKind::Unknown => ("unrecognized CI failure".to_string(), None, None),
    };

    CiFailure {
        check_name: check_name.to_string(),
        kind,
        error_message,
        file_path,
        line_number,
        raw_log: logs.to_string(),
    }
}
