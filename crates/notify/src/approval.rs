//! Blocking approval round-trip, layered onto the otherwise
//! fire-and-forget [`crate::Notifier`]. The `awaiting_approval` stage
//! calls [`crate::Notifier::request_approval`] and blocks (with a
//! timeout) until something calls back with a decision — an operator
//! using the CLI control surface, a Slack interaction webhook, or a test
//! harness.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub session_id: Uuid,
    pub reason: String,
}

impl ApprovalRequest {
    #[must_use]
    pub fn new(session_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Approved,
    Rejected,
    TimedOut,
}

/// Pending-approval registry: one outstanding oneshot sender per
/// in-flight request id.
#[derive(Default)]
pub struct PendingApprovals {
    senders: Mutex<HashMap<Uuid, oneshot::Sender<bool>>>,
}

impl PendingApprovals {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, oneshot::Sender<bool>>> {
        self.senders.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn register(&self, id: Uuid) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        rx
    }

    fn forget(&self, id: Uuid) {
        self.lock().remove(&id);
    }

    /// Resolve a pending request. Returns `true` if a matching pending
    /// request was found (and therefore woken), `false` otherwise (stale
    /// or unknown request id).
    pub fn resolve(&self, request_id: Uuid, approved: bool) -> bool {
        self.lock().remove(&request_id).is_some_and(|tx| tx.send(approved).is_ok())
    }

    /// Blocks until `resolve` is called for `request.id` or `timeout`
    /// elapses.
    pub async fn wait(&self, request_id: Uuid, timeout: Duration) -> ApprovalOutcome {
        let rx = self.register(request_id);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(true)) => ApprovalOutcome::Approved,
            Ok(Ok(false)) => ApprovalOutcome::Rejected,
            Ok(Err(_)) => ApprovalOutcome::TimedOut,
            Err(_) => {
                self.forget(request_id);
                ApprovalOutcome::TimedOut
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_to_approved_when_resolved_true() {
        let pending = PendingApprovals::new();
        let id = Uuid::new_v4();

        let wait = pending.wait(id, Duration::from_secs(5));
        let resolve = async {
            tokio::task::yield_now().await;
            assert!(pending.resolve(id, true));
        };

        let (outcome, ()) = tokio::join!(wait, resolve);
        assert_eq!(outcome, ApprovalOutcome::Approved);
    }

    #[tokio::test]
    async fn times_out_when_never_resolved() {
        let pending = PendingApprovals::new();
        let id = Uuid::new_v4();
        let outcome = pending.wait(id, Duration::from_millis(20)).await;
        assert_eq!(outcome, ApprovalOutcome::TimedOut);
    }

    #[test]
    fn resolving_unknown_request_returns_false() {
        let pending = PendingApprovals::new();
        assert!(!pending.resolve(Uuid::new_v4(), true));
    }
}
