//! Verification (test/format/lint) and deployment for the fix-session
//! engine's optional `test` and `deploy` stages.

pub mod deploy;
pub mod verifier;

pub use deploy::{Deployer, DockerComposeDeployer, NoopDeployer};
pub use verifier::{StepResult, VerifyConfig, VerifyReport, Verifier};
