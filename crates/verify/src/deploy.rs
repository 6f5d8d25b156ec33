//! `Deployer`: the optional `deploy` stage. Reference adapters only —
//! production container orchestration (the teacher's `kube` crate usage)
//! lives in the controller this spec doesn't reimplement.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use issues::WorkerError;
use tokio::process::Command;
use tokio::time::sleep;

#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, image_ref: &str) -> Result<(), WorkerError>;
    async fn health_check(&self, url: &str, timeout: Duration) -> Result<bool, WorkerError>;
    async fn rollback(&self) -> Result<(), WorkerError>;
}

/// Default deployer: every call is a no-op success. The engine runs with
/// this until an operator explicitly wires in a real one, matching
/// `auto_deploy_enabled = false` by default.
#[derive(Debug, Clone, Default)]
pub struct NoopDeployer;

#[async_trait]
impl Deployer for NoopDeployer {
    async fn deploy(&self, _image_ref: &str) -> Result<(), WorkerError> {
        Ok(())
    }

    async fn health_check(&self, _url: &str, _timeout: Duration) -> Result<bool, WorkerError> {
        Ok(true)
    }

    async fn rollback(&self) -> Result<(), WorkerError> {
        Ok(())
    }
}

/// Shells out to `docker compose up -d --build`, then polls a health URL.
#[derive(Debug, Clone)]
pub struct DockerComposeDeployer {
    pub compose_dir: PathBuf,
    pub service: Option<String>,
}

impl DockerComposeDeployer {
    #[must_use]
    pub fn new(compose_dir: PathBuf) -> Self {
        Self {
            compose_dir,
            service: None,
        }
    }

    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

#[async_trait]
impl Deployer for DockerComposeDeployer {
    async fn deploy(&self, image_ref: &str) -> Result<(), WorkerError> {
        let mut args = vec!["compose".to_string(), "up".to_string(), "-d".to_string(), "--build".to_string()];
        if let Some(service) = &self.service {
            args.push(service.clone());
        }

        let output = Command::new("docker")
            .args(&args)
            .current_dir(&self.compose_dir)
            .env("IMAGE_REF", image_ref)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(WorkerError::Deploy(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }

    async fn health_check(&self, url: &str, timeout: Duration) -> Result<bool, WorkerError> {
        let client = reqwest::Client::new();
        let deadline = tokio::time::Instant::now() + timeout;
        let poll_interval = Duration::from_secs(2);

        loop {
            if let Ok(response) = client.get(url).send().await {
                if response.status().is_success() {
                    return Ok(true);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(poll_interval).await;
        }
    }

    async fn rollback(&self) -> Result<(), WorkerError> {
        let output = Command::new("docker")
            .args(["compose", "down"])
            .current_dir(&self.compose_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(WorkerError::Deploy(String::from_utf8_lossy(&output.stderr).trim().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_deployer_always_succeeds() {
        let deployer = NoopDeployer;
        deployer.deploy("ghcr.io/example/app:latest").await.unwrap();
        assert!(deployer.health_check("http://localhost/healthz", Duration::from_secs(1)).await.unwrap());
        deployer.rollback().await.unwrap();
    }
}
