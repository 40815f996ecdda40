//! Machine configuration for the app and its release task

use std::collections::BTreeMap;

use tracing::{debug, warn};

use machines_client::models::{GuestConfig, MachineConfig, MachineSpec, Port, Service};

use crate::platform::PlatformCli;

/// Environment variable the image entrypoint runs as its command
pub const SERVER_COMMAND: &str = "SERVER_COMMAND";

/// Port the application listens on inside the machine
pub const INTERNAL_PORT: u16 = 8080;

const DEFAULT_CPUS: u32 = 1;
const DEFAULT_CPU_KIND: &str = "shared";
const DEFAULT_MEMORY_MB: u32 = 256;

/// Builds the baseline application machine config
#[derive(Debug, Clone)]
pub struct MachineConfigBuilder {
    app: String,
    image: String,
    region: String,
}

impl MachineConfigBuilder {
    pub fn new(app: impl Into<String>, image: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            image: image.into(),
            region: region.into(),
        }
    }

    pub fn build(self) -> MachineConfig {
        MachineConfig {
            name: Some(format!("{}-machine", self.app)),
            app: self.app,
            region: Some(self.region),
            spec: MachineSpec {
                image: self.image,
                guest: GuestConfig {
                    cpus: Some(DEFAULT_CPUS),
                    cpu_kind: Some(DEFAULT_CPU_KIND.to_string()),
                    memory_mb: Some(DEFAULT_MEMORY_MB),
                },
                services: default_services(),
                ..Default::default()
            },
        }
    }
}

/// HTTPS on 443 and HTTP on 80, both routed to the internal port over TCP
pub fn default_services() -> Vec<Service> {
    vec![Service {
        ports: vec![
            Port {
                port: 443,
                handlers: vec!["tls".to_string(), "http".to_string()],
            },
            Port {
                port: 80,
                handlers: vec!["http".to_string()],
            },
        ],
        protocol: "tcp".to_string(),
        internal_port: INTERNAL_PORT,
    }]
}

/// First region offered by the platform, or `default_region` if the query fails or is empty
pub async fn select_region(cli: &dyn PlatformCli, default_region: &str) -> String {
    match cli.list_regions().await {
        Ok(regions) => match regions.into_iter().next() {
            Some(region) => region,
            None => {
                debug!("No regions listed, using {}", default_region);
                default_region.to_string()
            }
        },
        Err(e) => {
            warn!("Unable to list regions, using {}: {}", default_region, e);
            default_region.to_string()
        }
    }
}

/// Derivation of the one-shot release machine from an app machine config
pub trait ReleaseVariant {
    /// Copy without services or mounts whose only environment runs `release_command`
    fn to_release(&self, release_command: &str) -> MachineConfig;
}

impl ReleaseVariant for MachineConfig {
    fn to_release(&self, release_command: &str) -> MachineConfig {
        let mut release = self.clone();
        release.spec.services.clear();
        release.spec.mounts.clear();
        release.spec.env = BTreeMap::from([(
            SERVER_COMMAND.to_string(),
            release_command.to_string(),
        )]);
        release
    }
}
