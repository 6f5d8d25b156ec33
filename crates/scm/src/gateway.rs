//! `VcsGateway`: branch/commit/PR/CI lifecycle, with a `gh`/`git`
//! subprocess reference adapter. Shelling out the way the teacher's
//! `GitHubClient` and check/lint runners do, generalized from one-shot
//! issue/comment calls to the full create-branch-through-rollback cycle a
//! fix session needs.

use std::path::Path;
use std::process::Output;

use async_trait::async_trait;
use issues::{WorkerError, WorkerResult};
use tokio::process::Command;

use crate::ci::{CheckConclusion, CheckStatus, CiCheck};

#[derive(Debug, Clone)]
pub struct PrHandle {
    pub number: u32,
    pub url: String,
}

#[async_trait]
pub trait VcsGateway: Send + Sync {
    async fn create_branch(&self, repo_path: &Path, branch_name: &str, base: &str) -> WorkerResult<()>;
    async fn commit(&self, repo_path: &Path, message: &str) -> WorkerResult<String>;
    async fn push(&self, repo_path: &Path, branch_name: &str) -> WorkerResult<()>;
    async fn open_pr(
        &self,
        repo_path: &Path,
        branch_name: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> WorkerResult<PrHandle>;
    async fn poll_checks(&self, repo_path: &Path, pr_number: u32) -> WorkerResult<Vec<CiCheck>>;
    async fn fetch_failed_logs(&self, repo_path: &Path, pr_number: u32, check_name: &str) -> WorkerResult<String>;
    async fn rollback(&self, repo_path: &Path, branch_name: &str) -> WorkerResult<()>;
}

/// Reference [`VcsGateway`] shelling out to the system `git` and `gh`
/// binaries. `repo_path` is passed as `git -C <path>` / `gh --repo` isn't
/// used here since `gh` infers the repo from the current directory via
/// `current_dir`.
#[derive(Debug, Clone, Default)]
pub struct GhCliGateway;

impl GhCliGateway {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn run(repo_path: &Path, program: &str, args: &[&str]) -> WorkerResult<Output> {
        let output = Command::new(program)
            .args(args)
            .current_dir(repo_path)
            .output()
            .await?;
        Ok(output)
    }

    fn require_success(context: &str, output: &Output) -> WorkerResult<()> {
        if output.status.success() {
            Ok(())
        } else {
            Err(WorkerError::Vcs(format!(
                "{context}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

#[async_trait]
impl VcsGateway for GhCliGateway {
    async fn create_branch(&self, repo_path: &Path, branch_name: &str, base: &str) -> WorkerResult<()> {
        let fetch = Self::run(repo_path, "git", &["fetch", "origin", base]).await?;
        Self::require_success("git fetch", &fetch)?;

        let checkout = Self::run(
            repo_path,
            "git",
            &["checkout", "-b", branch_name, &format!("origin/{base}")],
        )
        .await?;
        Self::require_success("git checkout -b", &checkout)
    }

    async fn commit(&self, repo_path: &Path, message: &str) -> WorkerResult<String> {
        let add = Self::run(repo_path, "git", &["add", "-A"]).await?;
        Self::require_success("git add", &add)?;

        let commit = Self::run(repo_path, "git", &["commit", "-m", message]).await?;
        Self::require_success("git commit", &commit)?;

        let rev_parse = Self::run(repo_path, "git", &["rev-parse", "HEAD"]).await?;
        Self::require_success("git rev-parse", &rev_parse)?;
        Ok(String::from_utf8_lossy(&rev_parse.stdout).trim().to_string())
    }

    async fn push(&self, repo_path: &Path, branch_name: &str) -> WorkerResult<()> {
        let push = Self::run(repo_path, "git", &["push", "-u", "origin", branch_name]).await?;
        Self::require_success("git push", &push)
    }

    async fn open_pr(
        &self,
        repo_path: &Path,
        branch_name: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> WorkerResult<PrHandle> {
        let output = Self::run(
            repo_path,
            "gh",
            &[
                "pr", "create", "--head", branch_name, "--base", base, "--title", title, "--body", body,
            ],
        )
        .await?;
        Self::require_success("gh pr create", &output)?;

        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let number = url
            .rsplit('/')
            .next()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| WorkerError::Vcs(format!("could not parse PR number from gh output: {url}")))?;
        Ok(PrHandle { number, url })
    }

    async fn poll_checks(&self, repo_path: &Path, pr_number: u32) -> WorkerResult<Vec<CiCheck>> {
        let output = Self::run(
            repo_path,
            "gh",
            &[
                "pr",
                "checks",
                &pr_number.to_string(),
                "--json",
                "name,state,bucket",
            ],
        )
        .await?;
        Self::require_success("gh pr checks", &output)?;

        let raw: Vec<GhCheckJson> = serde_json::from_slice(&output.stdout)
            .map_err(|e| WorkerError::Vcs(format!("failed to parse gh pr checks output: {e}")))?;
        Ok(raw.into_iter().map(GhCheckJson::into_ci_check).collect())
    }

    async fn fetch_failed_logs(&self, repo_path: &Path, pr_number: u32, check_name: &str) -> WorkerResult<String> {
        let output = Self::run(
            repo_path,
            "gh",
            &["run", "view", &pr_number.to_string(), "--log-failed", "--job", check_name],
        )
        .await?;
        Self::require_success("gh run view", &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn rollback(&self, repo_path: &Path, branch_name: &str) -> WorkerResult<()> {
        let checkout = Self::run(repo_path, "git", &["checkout", "main"]).await?;
        Self::require_success("git checkout main", &checkout)?;

        let delete_local = Self::run(repo_path, "git", &["branch", "-D", branch_name]).await?;
        Self::require_success("git branch -D", &delete_local)?;

        let delete_remote = Self::run(repo_path, "git", &["push", "origin", "--delete", branch_name]).await?;
        Self::require_success("git push --delete", &delete_remote)
    }
}

#[derive(Debug, serde::Deserialize)]
struct GhCheckJson {
    name: String,
    state: String,
    bucket: String,
}

impl GhCheckJson {
    fn into_ci_check(self) -> CiCheck {
        let status = match self.state.to_lowercase().as_str() {
            "queued" | "pending" | "requested" | "waiting" => CheckStatus::Queued,
            "in_progress" => CheckStatus::InProgress,
            _ => CheckStatus::Completed,
        };
        let conclusion = match self.bucket.to_lowercase().as_str() {
            "pass" => CheckConclusion::Success,
            "fail" => CheckConclusion::Failure,
            "cancel" => CheckConclusion::Cancelled,
            "skipping" => CheckConclusion::Skipped,
            _ => CheckConclusion::Pending,
        };
        CiCheck {
            name: self.name,
            status,
            conclusion,
            output_summary: None,
        }
    }
}
