//! Direct deploys: run the release machine to completion, then start the app machine

use std::sync::Arc;

use tracing::{error, info, warn};

use machines_client::models::{MachineConfig, MachineState};

use crate::app::state::DeployContext;
use crate::deploy::config::{select_region, MachineConfigBuilder, ReleaseVariant, SERVER_COMMAND};
use crate::deploy::database::{DatabaseDecision, DatabaseProvisioner, ProjectInspection};
use crate::deploy::fsm::{DeployEvent, DeployFsm};
use crate::deploy::lifecycle::{MachineLifecycle, WaitPolicy};
use crate::errors::{DeployError, MachineRole};
use crate::platform::flyctl::say_status;
use crate::platform::{MachinesApi, PlatformCli};

/// How a direct deploy ended without a fatal error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The app machine reported `started`
    Started { machine_id: String },

    /// The app machine never reported `started` within the wait budget
    StartTimedOut { machine_id: String },
}

/// Drives a direct deploy
pub struct ReleaseOrchestrator {
    ctx: Arc<DeployContext>,
    cli: Arc<dyn PlatformCli>,
    lifecycle: MachineLifecycle,
}

impl ReleaseOrchestrator {
    pub fn new(ctx: Arc<DeployContext>, api: Arc<dyn MachinesApi>, cli: Arc<dyn PlatformCli>) -> Self {
        Self {
            ctx,
            cli,
            lifecycle: MachineLifecycle::new(api),
        }
    }

    /// Deploy `image`: provision, release, start
    pub async fn deploy(
        &self,
        image: &str,
        inspection: &ProjectInspection,
    ) -> Result<DeployOutcome, DeployError> {
        let mut fsm = DeployFsm::direct();
        let result = self.run(&mut fsm, image, inspection).await;

        if let Err(e) = &result {
            if !fsm.phase().is_terminal() {
                fsm.process(DeployEvent::Abort(e.to_string()))?;
            }
            error!("Deploy of {} failed in {:?}: {}", self.ctx.app, fsm.phase(), e);
        }
        result
    }

    async fn run(
        &self,
        fsm: &mut DeployFsm,
        image: &str,
        inspection: &ProjectInspection,
    ) -> Result<DeployOutcome, DeployError> {
        let app = self.ctx.app.as_str();

        let region = select_region(self.cli.as_ref(), &self.ctx.settings.default_region).await;
        let secrets = self.cli.list_secrets(app).await?;
        let config = MachineConfigBuilder::new(app, image.trim(), region).build();
        fsm.process(DeployEvent::ConfigBuilt)?;

        let decision = DatabaseDecision::decide(inspection.database_adapter.as_deref(), &secrets);
        info!("Database decision for {}: {:?}", app, decision);
        let config = DatabaseProvisioner::new(self.ctx.clone(), self.cli.clone())
            .provision(decision, config)
            .await?;
        fsm.process(DeployEvent::DatabaseReady)?;

        // reaching `stopped` counts as success; the release exit code is not inspected here
        let release_id = self.release(&config).await?;
        fsm.process(DeployEvent::ReleaseSucceeded)?;
        self.lifecycle.delete_best_effort(app, &release_id).await;

        self.lifecycle.api().resolve_api_endpoint().await?;

        let outcome = self.start_app(&config).await?;
        match &outcome {
            DeployOutcome::Started { .. } => fsm.process(DeployEvent::AppStarted)?,
            DeployOutcome::StartTimedOut { .. } => fsm.process(DeployEvent::StartTimedOut)?,
        };
        Ok(outcome)
    }

    /// Run the release machine until it stops, returning its id
    pub async fn release(&self, config: &MachineConfig) -> Result<String, DeployError> {
        let release_config = config.to_release(&self.ctx.settings.release_command);
        say_status("fly", &release_config.spec.env[SERVER_COMMAND]);

        let wait = &self.ctx.settings.release_wait;
        let outcome = self
            .lifecycle
            .run_to_state(
                &self.ctx.app,
                &release_config,
                MachineRole::Release,
                MachineState::Stopped,
                WaitPolicy {
                    max_attempts: wait.max_attempts,
                    timeout: wait.timeout(),
                },
            )
            .await?;

        if !outcome.reached {
            return Err(DeployError::ReleaseTimedOut {
                machine_id: outcome.machine_id,
                attempts: outcome.attempts,
                last_status: outcome.last_status,
            });
        }

        Ok(outcome.machine_id)
    }

    /// Start the app machine and wait for it to report started
    pub async fn start_app(&self, config: &MachineConfig) -> Result<DeployOutcome, DeployError> {
        say_status("fly", &format!("start {}", self.ctx.app));

        let wait = &self.ctx.settings.start_wait;
        let outcome = self
            .lifecycle
            .run_to_state(
                &self.ctx.app,
                config,
                MachineRole::App,
                MachineState::Started,
                WaitPolicy {
                    max_attempts: wait.max_attempts,
                    timeout: wait.timeout(),
                },
            )
            .await?;

        if outcome.reached {
            Ok(DeployOutcome::Started {
                machine_id: outcome.machine_id,
            })
        } else {
            warn!("Timeout waiting for application to start");
            eprintln!("Timeout waiting for application to start");
            Ok(DeployOutcome::StartTimedOut {
                machine_id: outcome.machine_id,
            })
        }
    }
}
