//! Terraform command adapter

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command;
use tracing::info;

use crate::errors::DeployError;
use crate::platform::flyctl::say_status;
use crate::platform::InfrastructureTool;

/// Runs `terraform` in the project directory
#[derive(Debug, Clone)]
pub struct TerraformCli {
    program: String,
    work_dir: PathBuf,
}

impl TerraformCli {
    pub fn new(program: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Arguments for a non-interactive apply
    pub fn build_apply_args(&self) -> Vec<String> {
        vec!["apply".into(), "-auto-approve".into()]
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}

#[async_trait]
impl InfrastructureTool for TerraformCli {
    async fn apply(&self, env: &[(String, SecretString)]) -> Result<(), DeployError> {
        let args = self.build_apply_args();
        say_status("run", &format!("{} {}", self.program, args.join(" ")));

        let mut command = Command::new(&self.program);
        command.current_dir(&self.work_dir).args(&args);
        for (key, value) in env {
            command.env(key, value.expose_secret());
        }

        let status = command.status().await.map_err(|e| {
            DeployError::TerraformError(format!("Failed to run {}: {}", self.program, e))
        })?;

        if !status.success() {
            return Err(DeployError::TerraformError(format!(
                "{} apply exited with {}",
                self.program, status
            )));
        }

        info!("Terraform apply completed");
        Ok(())
    }
}
