//! `Dispatcher`: accepts submitted issues onto a FIFO queue and runs each
//! as its own fix-session task, bounded by `max_concurrent_fixes`
//! concurrent sessions. Exposes the control surface (`pause`/`resume`/
//! `cancel`/`retry`/`list_sessions`/`get_session`/`queue_depth`) that the
//! `orchestrator` CLI wraps, usable directly in tests without a CLI.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use issues::Issue;
use store::{FixSession, SessionStatus};
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::context::EngineContext;
use crate::session;

struct QueuedIssue {
    session: FixSession,
}

/// The pause-loop's poll interval: how long a paused dispatcher waits
/// between checks of whether it's been resumed.
const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct Dispatcher {
    ctx: EngineContext,
    queue_tx: mpsc::UnboundedSender<QueuedIssue>,
    in_flight: Arc<RwLock<HashMap<Uuid, JoinHandle<()>>>>,
    queue_depth: Arc<AtomicUsize>,
    paused: Arc<AtomicBool>,
}

impl Dispatcher {
    /// Spawns the dispatcher's background dequeue loop and returns a
    /// handle to it. The loop runs for as long as any clone of the
    /// returned `Dispatcher` (or its sender) is alive.
    #[must_use]
    pub fn spawn(ctx: EngineContext) -> Self {
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<QueuedIssue>();
        let in_flight: Arc<RwLock<HashMap<Uuid, JoinHandle<()>>>> = Arc::new(RwLock::new(HashMap::new()));
        let queue_depth = Arc::new(AtomicUsize::new(0));
        let paused = Arc::new(AtomicBool::new(false));
        let semaphore = Arc::new(Semaphore::new(ctx.options.max_concurrent_fixes));

        let loop_ctx = ctx.clone();
        let loop_in_flight = in_flight.clone();
        let loop_queue_depth = queue_depth.clone();
        let loop_paused = paused.clone();
        let loop_queue_tx = queue_tx.clone();

        tokio::spawn(async move {
            while let Some(queued) = queue_rx.recv().await {
                loop_queue_depth.fetch_sub(1, Ordering::SeqCst);

                while loop_paused.load(Ordering::SeqCst) {
                    tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
                }

                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("the dispatcher's semaphore is never closed");
                let session_ctx = loop_ctx.clone();
                let session_id = queued.session.id;
                let in_flight_for_task = loop_in_flight.clone();
                let requeue_tx = loop_queue_tx.clone();
                let requeue_depth = loop_queue_depth.clone();

                let handle = tokio::spawn(async move {
                    let _permit = permit;
                    let backoff = session_ctx.options.budget_stall_backoff();
                    let outcome = session::run_session(session_ctx, queued.session).await;
                    in_flight_for_task.write().await.remove(&session_id);

                    // The permit is dropped here, so a stalled session's
                    // slot is free for other queued work while it waits
                    // out the backoff on its own background task.
                    if let session::SessionOutcome::Stalled(stalled) = outcome {
                        tokio::spawn(async move {
                            tokio::time::sleep(backoff).await;
                            requeue_depth.fetch_add(1, Ordering::SeqCst);
                            let _ = requeue_tx.send(QueuedIssue { session: *stalled });
                        });
                    }
                });

                loop_in_flight.write().await.insert(session_id, handle);
            }
        });

        Self {
            ctx,
            queue_tx,
            in_flight,
            queue_depth,
            paused,
        }
    }

    /// Accepts a normalized issue, persisting it as a freshly `Queued`
    /// [`FixSession`] and enqueuing it for the dequeue loop. Returns the
    /// assigned session id.
    pub fn submit(&self, issue: Issue) -> Uuid {
        let session = FixSession::new(issue);
        let id = session.id;
        if let Err(error) = self.ctx.store.save_session(&session) {
            tracing::warn!(%error, "failed to persist newly submitted session");
        }
        self.queue_depth.fetch_add(1, Ordering::SeqCst);
        let _ = self.queue_tx.send(QueuedIssue { session });
        id
    }

    /// Stops handing queued issues a concurrency slot. Sessions already
    /// running keep going to their terminal status; only new dequeues are
    /// held back.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Aborts an in-flight session's task and marks it `Blocked` (operator
    /// cancellation is never learned from). Does not roll back any branch
    /// or PR the session may already have created — an operator who wants
    /// a clean rollback should let it reach a terminal status on its own
    /// instead of cancelling it.
    pub async fn cancel(&self, session_id: Uuid) -> bool {
        let handle = self.in_flight.write().await.remove(&session_id);
        let Some(handle) = handle else {
            return false;
        };
        handle.abort();

        if let Ok(Some(mut session)) = self.ctx.store.load_session(session_id) {
            if !session.status.is_terminal() {
                session.error_message = Some("cancelled by operator".to_string());
                session.transition(SessionStatus::Blocked);
                if let Err(error) = self.ctx.store.save_session(&session) {
                    tracing::warn!(%error, "failed to persist cancelled session");
                }
            }
        }
        true
    }

    /// Re-queues a terminal session's issue as a brand-new session.
    /// Returns `None` if `session_id` is unknown or hasn't reached a
    /// terminal status yet.
    pub async fn retry(&self, session_id: Uuid) -> Option<Uuid> {
        let original = self.ctx.store.load_session(session_id).ok().flatten()?;
        if !original.status.is_terminal() {
            return None;
        }
        Some(self.submit(original.issue))
    }

    #[must_use]
    pub fn list_sessions(&self, status: Option<SessionStatus>) -> Vec<FixSession> {
        self.ctx.store.list_sessions(status).unwrap_or_default()
    }

    #[must_use]
    pub fn get_session(&self, session_id: Uuid) -> Option<FixSession> {
        self.ctx.store.load_session(session_id).ok().flatten()
    }

    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Options;
    use issues::RawIssue;
    use llm::{LlmClient, LlmError, LlmResponse};
    use notify::Notifier;
    use safety::{CostTracker, RateLimiter};
    use scm::{CiCheck, PrHandle, VcsGateway};
    use std::collections::HashMap as StdHashMap;
    use store::Store;
    use verify::{NoopDeployer, Verifier};

    use crate::issue_source::NullIssueSource;

    struct EmptyLlm;
    #[async_trait::async_trait]
    impl LlmClient for EmptyLlm {
        async fn ask(&self, _prompt: &str, _max_tokens: u32, _model: Option<&str>) -> Result<LlmResponse, LlmError> {
            Ok(LlmResponse {
                text: String::new(),
                input_tokens: 0,
                output_tokens: 0,
            })
        }
    }

    struct StubVcs;
    #[async_trait::async_trait]
    impl VcsGateway for StubVcs {
        async fn create_branch(&self, _repo_path: &std::path::Path, _branch_name: &str, _base: &str) -> issues::WorkerResult<()> {
            Ok(())
        }
        async fn commit(&self, _repo_path: &std::path::Path, _message: &str) -> issues::WorkerResult<String> {
            Ok("deadbeef".to_string())
        }
        async fn push(&self, _repo_path: &std::path::Path, _branch_name: &str) -> issues::WorkerResult<()> {
            Ok(())
        }
        async fn open_pr(
            &self,
            _repo_path: &std::path::Path,
            _branch_name: &str,
            _base: &str,
            _title: &str,
            _body: &str,
        ) -> issues::WorkerResult<PrHandle> {
            Ok(PrHandle {
                number: 1,
                url: "https://example.invalid/pr/1".to_string(),
            })
        }
        async fn poll_checks(&self, _repo_path: &std::path::Path, _pr_number: u32) -> issues::WorkerResult<Vec<CiCheck>> {
            Ok(Vec::new())
        }
        async fn fetch_failed_logs(&self, _repo_path: &std::path::Path, _pr_number: u32, _check_name: &str) -> issues::WorkerResult<String> {
            Ok(String::new())
        }
        async fn rollback(&self, _repo_path: &std::path::Path, _branch_name: &str) -> issues::WorkerResult<()> {
            Ok(())
        }
    }

    fn test_ctx() -> EngineContext {
        let options = Options {
            max_concurrent_fixes: 2,
            ..Options::default()
        };
        let store = Arc::new(Store::open_in_memory().unwrap());
        EngineContext::new(
            Arc::new(options),
            store.clone(),
            Arc::new(EmptyLlm),
            Arc::new(Notifier::disabled()),
            Arc::new(StubVcs),
            Arc::new(Verifier::default()),
            Arc::new(NoopDeployer),
            Arc::new(CostTracker::new(store, 50.0)),
            Arc::new(RateLimiter::new(StdHashMap::new())),
            Arc::new(NullIssueSource),
        )
    }

    fn sample_issue() -> Issue {
        Issue::normalize(RawIssue {
            title: Some("Login button misaligned".to_string()),
            ..Default::default()
        })
    }

    async fn wait_for_terminal(dispatcher: &Dispatcher, id: Uuid) -> FixSession {
        for _ in 0..200 {
            if let Some(session) = dispatcher.get_session(id) {
                if session.status.is_terminal() {
                    return session;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session {id} never reached a terminal status");
    }

    #[tokio::test]
    async fn submit_runs_the_session_to_a_terminal_status() {
        let dispatcher = Dispatcher::spawn(test_ctx());
        let id = dispatcher.submit(sample_issue());

        let session = wait_for_terminal(&dispatcher, id).await;
        // An empty LLM response can't be parsed into an analysis payload,
        // so this session fails during `analyze` rather than completing.
        assert_eq!(session.status, SessionStatus::Failed);
    }

    #[tokio::test]
    async fn pause_holds_queued_sessions_back() {
        let dispatcher = Dispatcher::spawn(test_ctx());
        dispatcher.pause();
        let id = dispatcher.submit(sample_issue());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let session = dispatcher.get_session(id).unwrap();
        assert_eq!(session.status, SessionStatus::Queued);

        dispatcher.resume();
        let session = wait_for_terminal(&dispatcher, id).await;
        assert_eq!(session.status, SessionStatus::Failed);
    }

    #[tokio::test]
    async fn retry_resubmits_a_terminal_session_as_a_new_one() {
        let dispatcher = Dispatcher::spawn(test_ctx());
        let id = dispatcher.submit(sample_issue());
        wait_for_terminal(&dispatcher, id).await;

        let retried_id = dispatcher.retry(id).await.expect("retry should succeed on a terminal session");
        assert_ne!(retried_id, id);
        wait_for_terminal(&dispatcher, retried_id).await;
    }

    #[tokio::test]
    async fn exhausted_budget_stalls_instead_of_failing() {
        let mut options = Options {
            max_concurrent_fixes: 2,
            ..Options::default()
        };
        options.budget_stall_backoff_secs = 1;
        let store = Arc::new(Store::open_in_memory().unwrap());
        let ctx = EngineContext::new(
            Arc::new(options),
            store.clone(),
            Arc::new(EmptyLlm),
            Arc::new(Notifier::disabled()),
            Arc::new(StubVcs),
            Arc::new(Verifier::default()),
            Arc::new(NoopDeployer),
            Arc::new(CostTracker::new(store, 0.0)),
            Arc::new(RateLimiter::new(StdHashMap::new())),
            Arc::new(NullIssueSource),
        );
        let dispatcher = Dispatcher::spawn(ctx);
        let id = dispatcher.submit(sample_issue());

        tokio::time::sleep(Duration::from_millis(150)).await;
        let session = dispatcher.get_session(id).unwrap();
        // classify never got to run an LLM call, so no partial progress
        // and no Failure row: the session is simply parked waiting for
        // budget to free up, and gets re-enqueued (still Queued) rather
        // than failed.
        assert_eq!(session.status, SessionStatus::Queued);
        assert!(session.error_message.is_none());
    }

    #[tokio::test]
    async fn retry_refuses_a_still_running_session() {
        let dispatcher = Dispatcher::spawn(test_ctx());
        dispatcher.pause();
        let id = dispatcher.submit(sample_issue());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(dispatcher.retry(id).await.is_none());
        dispatcher.resume();
    }
}
