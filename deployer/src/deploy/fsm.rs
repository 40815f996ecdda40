//! Finite state machine for a single deploy invocation

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::DeployError;

/// Which deploy path is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployVariant {
    /// This process creates and starts every machine
    Direct,

    /// Release here, then hand the rest to terraform
    Terraform,
}

/// Deploy phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployPhase {
    /// Assembling the app machine config
    BuildConfig,

    /// Creating a volume or managed database
    ProvisionDatabase,

    /// Rewriting the terraform file and deriving the release config
    PatchConfig,

    /// Release machine running
    RunRelease,

    /// App machine starting
    StartApp,

    /// Terraform apply running
    Apply,

    /// App machine started
    Started,

    /// App machine did not report started in time
    TimedOut,

    /// Terraform apply finished
    Applied,

    /// Deploy aborted
    Failed,
}

impl DeployPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeployPhase::Started | DeployPhase::TimedOut | DeployPhase::Applied | DeployPhase::Failed
        )
    }
}

/// Deploy event
#[derive(Debug, Clone)]
pub enum DeployEvent {
    ConfigBuilt,
    DatabaseReady,
    ConfigPatched,
    ReleaseSucceeded,
    ReleaseFailed(String),
    AppStarted,
    StartTimedOut,
    Applied,
    Abort(String),
}

/// Deploy FSM
#[derive(Debug, Clone)]
pub struct DeployFsm {
    variant: DeployVariant,
    phase: DeployPhase,
    error: Option<String>,
}

impl DeployFsm {
    /// Direct deploys start by building the machine config
    pub fn direct() -> Self {
        Self {
            variant: DeployVariant::Direct,
            phase: DeployPhase::BuildConfig,
            error: None,
        }
    }

    /// Terraform deploys start by patching the configuration file
    pub fn terraform() -> Self {
        Self {
            variant: DeployVariant::Terraform,
            phase: DeployPhase::PatchConfig,
            error: None,
        }
    }

    pub fn variant(&self) -> DeployVariant {
        self.variant
    }

    /// Get current phase
    pub fn phase(&self) -> DeployPhase {
        self.phase
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition phase
    pub fn process(&mut self, event: DeployEvent) -> Result<DeployPhase, DeployError> {
        let next = match (self.phase, &event) {
            (DeployPhase::BuildConfig, DeployEvent::ConfigBuilt) => DeployPhase::ProvisionDatabase,
            (DeployPhase::ProvisionDatabase, DeployEvent::DatabaseReady) => DeployPhase::RunRelease,
            (DeployPhase::PatchConfig, DeployEvent::ConfigPatched) => DeployPhase::RunRelease,

            (DeployPhase::RunRelease, DeployEvent::ReleaseSucceeded) => match self.variant {
                DeployVariant::Direct => DeployPhase::StartApp,
                DeployVariant::Terraform => DeployPhase::Apply,
            },
            (DeployPhase::RunRelease, DeployEvent::ReleaseFailed(err)) => {
                self.error = Some(err.clone());
                DeployPhase::Failed
            }

            (DeployPhase::StartApp, DeployEvent::AppStarted) => DeployPhase::Started,
            (DeployPhase::StartApp, DeployEvent::StartTimedOut) => DeployPhase::TimedOut,
            (DeployPhase::Apply, DeployEvent::Applied) => DeployPhase::Applied,

            (phase, DeployEvent::Abort(err)) if !phase.is_terminal() => {
                self.error = Some(err.clone());
                DeployPhase::Failed
            }

            (phase, event) => {
                return Err(DeployError::InvalidTransition(format!(
                    "{:?} -> {:?}",
                    phase, event
                )));
            }
        };

        debug!("Deploy phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
        Ok(next)
    }
}
