//! Safety gates: cost budget tracking, per-operation rate limiting, and the
//! approval-required decision for a proposed fix strategy.

mod approval;
mod cost;
mod rate_limit;

pub use approval::ApprovalGate;
pub use cost::CostTracker;
pub use rate_limit::RateLimiter;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SafetyError {
    #[error(transparent)]
    Store(#[from] store::StoreError),
}
