//! `EngineContext`: every external dependency a fix-session needs, bundled
//! once at dispatcher construction and cheaply cloned (every field is an
//! `Arc`, plus two handles the runner locks across stage boundaries).

use std::path::PathBuf;
use std::sync::Arc;

use config::Options;
use editor::CodeEditor;
use llm::{LlmClient, LlmError, LlmResponse};
use notify::Notifier;
use safety::{CostTracker, RateLimiter};
use scm::VcsGateway;
use store::{FixSession, Store};
use tokio::sync::Mutex as AsyncMutex;
use verify::{Deployer, Verifier};

use crate::issue_source::IssueSource;

#[derive(Clone)]
pub struct EngineContext {
    pub options: Arc<Options>,
    pub store: Arc<Store>,
    pub llm: Arc<dyn LlmClient>,
    pub notifier: Arc<Notifier>,
    pub vcs: Arc<dyn VcsGateway>,
    pub verifier: Arc<Verifier>,
    pub deployer: Arc<dyn Deployer>,
    pub cost_tracker: Arc<CostTracker>,
    pub rate_limiter: Arc<RateLimiter>,
    pub editor: CodeEditor,
    pub issue_source: Arc<dyn IssueSource>,
    pub repo_path: PathBuf,
    /// Held from `create_branch` through `open_pr` or `rollback` (§5):
    /// only one session may touch the shared working copy at a time.
    pub repo_lock: Arc<AsyncMutex<()>>,
    /// Held for the duration of a `deploy` stage: only one deploy runs
    /// against the target environment at a time.
    pub deploy_lock: Arc<AsyncMutex<()>>,
}

impl EngineContext {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        options: Arc<Options>,
        store: Arc<Store>,
        llm: Arc<dyn LlmClient>,
        notifier: Arc<Notifier>,
        vcs: Arc<dyn VcsGateway>,
        verifier: Arc<Verifier>,
        deployer: Arc<dyn Deployer>,
        cost_tracker: Arc<CostTracker>,
        rate_limiter: Arc<RateLimiter>,
        issue_source: Arc<dyn IssueSource>,
    ) -> Self {
        let repo_path = PathBuf::from(options.repository_path.clone());
        let editor = CodeEditor::new(options.editor_fuzzy_threshold);
        Self {
            options,
            store,
            llm,
            notifier,
            vcs,
            verifier,
            deployer,
            cost_tracker,
            rate_limiter,
            editor,
            issue_source,
            repo_path,
            repo_lock: Arc::new(AsyncMutex::new(())),
            deploy_lock: Arc::new(AsyncMutex::new(())),
        }
    }

    /// Calls the LLM, bills tokens/cost to both the cost tracker and the
    /// session, and fires the once-per-day budget warning if applicable.
    pub async fn ask_llm(
        &self,
        session: &mut FixSession,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        if !self.rate_limiter.check("llm_query").await {
            return Err(LlmError::NotAdmitted("llm_query rate limit reached".to_string()));
        }
        if !self.cost_tracker.can_proceed().unwrap_or(false) {
            return Err(LlmError::NotAdmitted("daily cost budget exhausted".to_string()));
        }
        self.rate_limiter.record("llm_query").await;
        let response: LlmResponse = self.llm.ask(prompt, max_tokens, None).await?;

        let model = self.options.llm_default_model.clone();
        let price = self.options.price_for(&model);
        let cost = llm::pricing::cost_usd(&price, response.input_tokens, response.output_tokens);

        session.tokens_used += u64::from(response.input_tokens) + u64::from(response.output_tokens);
        session.accumulated_cost += cost;

        if let Err(error) = self.cost_tracker.record_usage(
            Some(session.id),
            &model,
            response.input_tokens,
            response.output_tokens,
            cost,
        ) {
            tracing::warn!(%error, "failed to record LLM usage");
        }

        match self.cost_tracker.check_budget_warning() {
            Ok(Some(message)) => {
                tracing::warn!(message);
                if let Ok(today_cost) = self.cost_tracker.today_cost() {
                    self.notifier.notify(notify::NotifyEvent::BudgetWarning {
                        today_cost_usd: today_cost,
                        daily_limit_usd: self.options.daily_cost_limit,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
            Ok(None) => {}
            Err(error) => tracing::warn!(%error, "failed to check budget warning"),
        }

        Ok(response.text)
    }
}
