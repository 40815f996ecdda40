//! Wires the platform adapters together and runs one command

use std::env;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::app::options::{Command, RunOptions};
use crate::app::state::DeployContext;
use crate::deploy::database::ProjectInspection;
use crate::deploy::release::{DeployOutcome, ReleaseOrchestrator};
use crate::deploy::terraform::TerraformConfigPatcher;
use crate::errors::DeployError;
use crate::http::client::HttpClient;
use crate::http::endpoint::ApiEndpoint;
use crate::logs::{init_logging, LogOptions};
use crate::platform::flyctl::FlyctlCli;
use crate::platform::terraform::TerraformCli;
use crate::platform::{IpVersion, MachinesApi, PlatformCli};
use crate::storage::settings::{load_settings, Settings};

pub const API_TOKEN_VAR: &str = "FLY_API_TOKEN";
pub const API_ENDPOINT_VAR: &str = "FLY_HTTP_ENDPOINT";

/// Run the command described by `options`
pub async fn run(options: RunOptions) -> Result<(), DeployError> {
    let settings = load_settings(&options.layout.settings_file()).await?;

    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.json_logs,
    };
    if let Err(e) = init_logging(log_options) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let cli = Arc::new(FlyctlCli::new(settings.flyctl.clone()));
    let ctx = Arc::new(
        DeployContext::load(options.app.clone(), options.layout.clone(), settings, cli.as_ref()).await?,
    );
    info!("Running {:?} for {}", options.command, ctx.app);

    match &options.command {
        Command::Deploy { image } => {
            let api = machines_api(&ctx, cli.as_ref()).await?;
            let inspection = ProjectInspection::load(&ctx.layout).await;
            if let Some(adapter) = &inspection.cable_adapter {
                info!("Action cable adapter: {}", adapter);
            }

            let orchestrator = ReleaseOrchestrator::new(ctx.clone(), api, cli);
            match orchestrator.deploy(image, &inspection).await? {
                DeployOutcome::Started { machine_id } => {
                    info!("Application machine {} started", machine_id)
                }
                DeployOutcome::StartTimedOut { machine_id } => {
                    warn!("Application machine {} has not started yet", machine_id)
                }
            }
        }
        Command::Terraform { image } => {
            let api = machines_api(&ctx, cli.as_ref()).await?;
            let tool = Arc::new(TerraformCli::new(
                ctx.settings.terraform.clone(),
                ctx.layout.root_dir.clone(),
            ));

            let patcher = TerraformConfigPatcher::new(ctx.clone(), api, cli, tool);
            let outcome = patcher.deploy(image, tokio::time::sleep).await?;
            info!("Release {} finished and terraform applied", outcome.machine_id);
        }
        Command::AllocateIps { v4, v6 } => {
            allocate_ips(&ctx.app, cli.as_ref(), *v4, *v6).await?;
        }
        Command::Version => {}
    }

    Ok(())
}

/// Allocate the requested address families. Neither flag means both.
pub async fn allocate_ips(app: &str, cli: &dyn PlatformCli, v4: bool, v6: bool) -> Result<(), DeployError> {
    let both = !v4 && !v6;
    if v4 || both {
        cli.allocate_ip(app, IpVersion::V4).await?;
    }
    if v6 || both {
        cli.allocate_ip(app, IpVersion::V6).await?;
    }
    Ok(())
}

/// Machines API client authenticated with the environment token or the CLI's
async fn machines_api(ctx: &DeployContext, cli: &dyn PlatformCli) -> Result<Arc<dyn MachinesApi>, DeployError> {
    let token = match env::var(API_TOKEN_VAR) {
        Ok(token) if !token.is_empty() => SecretString::from(token),
        _ => cli.auth_token().await?,
    };

    let endpoint = ApiEndpoint::new(configured_endpoint(&ctx.settings), ctx.settings.flyctl.clone());
    let client = HttpClient::new(token, endpoint)?;
    debug!("Machines API client ready");

    Ok(Arc::new(client))
}

/// Settings override first, then the environment
fn configured_endpoint(settings: &Settings) -> Option<String> {
    settings
        .api_endpoint
        .clone()
        .or_else(|| env::var(API_ENDPOINT_VAR).ok())
        .filter(|host| !host.is_empty())
}
