//! Outcome of a single fix-session stage function.

use store::SessionStatus;

/// What a stage function decided, before the runner turns it into a
/// persisted state transition.
#[derive(Debug)]
pub enum StageOutcome<T> {
    /// The stage completed; the runner advances past it.
    Success(T),
    /// The stage failed in a way the retry loop should absorb, up to
    /// `max_fix_retries`.
    Retryable(String),
    /// The stage failed (or the session was denied) in a way that ends
    /// the session outright, landing on the given terminal status.
    Terminal(SessionStatus, String),
    /// A safety gate (cost budget or rate limit) would not admit the call
    /// this stage needed. Not a failure: the session stays in its current
    /// status and the dispatcher re-enqueues it after a backoff.
    Stalled(String),
}

impl<T> StageOutcome<T> {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
