//! Per-invocation deploy context

use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::DeployError;
use crate::platform::PlatformCli;
use crate::storage::layout::ProjectLayout;
use crate::storage::settings::Settings;

/// Organization used when the app's owner cannot be determined
pub const DEFAULT_ORG: &str = "personal";

/// Everything a deploy needs to know about its target, built once at startup
#[derive(Debug, Clone)]
pub struct DeployContext {
    /// Platform app name
    pub app: String,

    /// Organization owning the app
    pub org: String,

    pub layout: ProjectLayout,

    pub settings: Settings,
}

#[derive(Debug, Deserialize)]
struct FlyToml {
    app: Option<String>,
}

impl DeployContext {
    pub fn new(app: impl Into<String>, org: impl Into<String>, layout: ProjectLayout, settings: Settings) -> Self {
        Self {
            app: app.into(),
            org: org.into(),
            layout,
            settings,
        }
    }

    /// Build the context, taking the app name from `app` or else `fly.toml`
    pub async fn load(
        app: Option<String>,
        layout: ProjectLayout,
        settings: Settings,
        cli: &dyn PlatformCli,
    ) -> Result<Self, DeployError> {
        let app = match app {
            Some(app) => app,
            None => read_app_name(&layout).await?,
        };

        let org = match cli.app_organization(&app).await {
            Ok(Some(org)) => org,
            Ok(None) => DEFAULT_ORG.to_string(),
            Err(e) => {
                warn!("Unable to look up organization for {}: {}", app, e);
                DEFAULT_ORG.to_string()
            }
        };
        debug!("Deploying {} in organization {}", app, org);

        Ok(Self::new(app, org, layout, settings))
    }
}

/// App name declared in `fly.toml`
pub async fn read_app_name(layout: &ProjectLayout) -> Result<String, DeployError> {
    let file = layout.fly_toml();
    let fly_toml: FlyToml = file.read_toml().await?;
    fly_toml.app.filter(|a| !a.is_empty()).ok_or_else(|| {
        DeployError::ConfigError(format!("No app name in {}", file.path().display()))
    })
}
