//! `IssueSource`: the feed a session's `classify` stage is seeded from, and
//! the re-run the `validate` stage uses to see whether the issue it just
//! fixed still reproduces.

use async_trait::async_trait;
use issues::{Issue, WorkerResult};

#[async_trait]
pub trait IssueSource: Send + Sync {
    /// Fresh reports from `reporter` (or every known reporter, if `None`),
    /// as if that persona ran its checks again right now.
    async fn rerun(&self, reporter: Option<&str>) -> WorkerResult<Vec<Issue>>;
}

/// An `IssueSource` that never finds anything wrong. Used as a default
/// when no tester integration is wired in; `validate` then always passes.
#[derive(Debug, Clone, Default)]
pub struct NullIssueSource;

#[async_trait]
impl IssueSource for NullIssueSource {
    async fn rerun(&self, _reporter: Option<&str>) -> WorkerResult<Vec<Issue>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_source_reports_nothing() {
        let source = NullIssueSource;
        assert!(source.rerun(Some("mobile-tester")).await.unwrap().is_empty());
    }
}
