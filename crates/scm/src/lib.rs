//! VCS/CI gateway for the fix-session engine: branch, commit, push, open a
//! PR, poll and classify CI checks, roll back.

pub mod ci;
pub mod gateway;

pub use ci::{
    classify_failure, overall_status, parse_ci_logs, CheckConclusion, CheckStatus, CiCheck,
    CiFailure, CiFailureKind, OverallStatus,
};
pub use gateway::{GhCliGateway, PrHandle, VcsGateway};
pub use issues::{WorkerError, WorkerResult};
