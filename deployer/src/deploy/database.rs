//! Database provisioning decisions

use std::sync::Arc;

use secrecy::SecretString;
use serde_yaml::Value;
use tracing::{debug, info};

use machines_client::models::{MachineConfig, Mount};

use crate::app::state::DeployContext;
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::platform::flyctl::say_status;
use crate::platform::{PlatformCli, PostgresRequest};
use crate::storage::layout::ProjectLayout;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const VOLUME_MOUNT_PATH: &str = "/mnt/volume";
pub const SQLITE_DATABASE_URL: &str = "sqlite3:///mnt/volume/production.sqlite3";

/// What to provision for the app's database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseDecision {
    /// Nothing to do
    None,

    /// Create a volume and point sqlite at it
    SqliteWithVolume,

    /// Create a managed Postgres cluster and store its URL as a secret
    PostgresManaged,
}

impl DatabaseDecision {
    pub fn decide(adapter: Option<&str>, secrets: &[String]) -> Self {
        match adapter {
            Some("sqlite3") => DatabaseDecision::SqliteWithVolume,
            Some("postgresql") if !secrets.iter().any(|s| s == DATABASE_URL) => {
                DatabaseDecision::PostgresManaged
            }
            _ => DatabaseDecision::None,
        }
    }
}

/// Adapters declared by the Rails app
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectInspection {
    pub database_adapter: Option<String>,
    pub cable_adapter: Option<String>,
}

impl ProjectInspection {
    /// Read the production adapters; unreadable files count as undeclared
    pub async fn load(layout: &ProjectLayout) -> Self {
        let inspection = Self {
            database_adapter: read_adapter(&layout.database_yml()).await,
            cable_adapter: read_adapter(&layout.cable_yml()).await,
        };
        debug!(
            "Database adapter: {:?}, cable adapter: {:?}",
            inspection.database_adapter, inspection.cable_adapter
        );
        inspection
    }
}

/// `production.adapter` from a Rails YAML config, following a `<<` merge key
pub async fn read_adapter(file: &File) -> Option<String> {
    let value: Value = match file.read_yaml().await {
        Ok(value) => value,
        Err(e) => {
            debug!("Ignoring {}: {}", file.path().display(), e);
            return None;
        }
    };

    production_adapter(&value)
}

fn production_adapter(value: &Value) -> Option<String> {
    let production = value.get("production")?;
    production
        .get("adapter")
        .or_else(|| production.get("<<").and_then(|base| base.get("adapter")))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Volume name for an app: dashes become underscores, suffixed `_volume`
pub fn volume_name(app: &str) -> String {
    format!("{}_volume", app.replace('-', "_"))
}

/// Carries out a [`DatabaseDecision`]
pub struct DatabaseProvisioner {
    ctx: Arc<DeployContext>,
    cli: Arc<dyn PlatformCli>,
}

impl DatabaseProvisioner {
    pub fn new(ctx: Arc<DeployContext>, cli: Arc<dyn PlatformCli>) -> Self {
        Self { ctx, cli }
    }

    /// Create the app's volume unless one with the derived name exists
    pub async fn ensure_volume(&self, app: &str, region: &str, size_gb: u32) -> Result<String, DeployError> {
        let volume = volume_name(app);
        let existing = self.cli.list_volumes(app).await?;

        if existing.iter().any(|v| v == &volume) {
            debug!("Volume {} already exists", volume);
        } else {
            info!("Creating volume {} ({} GB) in {}", volume, size_gb, region);
            self.cli.create_volume(app, &volume, region, size_gb).await?;
        }

        Ok(volume)
    }

    /// Apply `decision`, returning the config the app machine should use
    pub async fn provision(
        &self,
        decision: DatabaseDecision,
        mut config: MachineConfig,
    ) -> Result<MachineConfig, DeployError> {
        let app = self.ctx.app.as_str();
        let region = config
            .region
            .clone()
            .unwrap_or_else(|| self.ctx.settings.default_region.clone());

        match decision {
            DatabaseDecision::None => {}
            DatabaseDecision::SqliteWithVolume => {
                let size = self.ctx.settings.database.volume_size_gb;
                let volume = self.ensure_volume(app, &region, size).await?;

                config.spec.mounts = vec![Mount {
                    volume,
                    path: VOLUME_MOUNT_PATH.to_string(),
                }];
                config
                    .spec
                    .env
                    .insert(DATABASE_URL.to_string(), SQLITE_DATABASE_URL.to_string());
            }
            DatabaseDecision::PostgresManaged => {
                let db = &self.ctx.settings.database;
                let request = PostgresRequest {
                    name: format!("{}-db", app),
                    org: self.ctx.org.clone(),
                    region,
                    vm_size: db.postgres_vm_size.clone(),
                    volume_size_gb: db.postgres_volume_size_gb,
                    cluster_size: db.postgres_cluster_size,
                };

                let url = self.cli.create_postgres(&request).await?.ok_or_else(|| {
                    DeployError::DatabaseError(format!(
                        "No connection string found in output of postgres create for {}",
                        request.name
                    ))
                })?;

                say_status("fly", &format!("secrets set {}", DATABASE_URL));
                self.cli
                    .set_secret(app, DATABASE_URL, &SecretString::from(url))
                    .await?;
            }
        }

        Ok(config)
    }
}
