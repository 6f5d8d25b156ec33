//! Fix-session engine: classify/analyze/strategize/implement/test a single
//! issue end to end, repair CI failures on the resulting PR, optionally
//! deploy, and validate the fix actually held — all orchestrated by a
//! [`dispatcher::Dispatcher`] running up to `max_concurrent_fixes` sessions
//! at once.

pub mod context;
pub mod dispatcher;
pub mod files;
pub mod issue_source;
pub mod outcome;
pub mod prompts;
pub mod session;
pub mod similarity;
pub mod stages;

pub use context::EngineContext;
pub use dispatcher::Dispatcher;
pub use issue_source::IssueSource;
pub use outcome::StageOutcome;
