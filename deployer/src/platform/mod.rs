//! Interfaces to the remote platform.
//!
//! The orchestration code only talks to these traits. The HTTP client in
//! [`crate::http`] implements [`MachinesApi`]; [`flyctl::FlyctlCli`] and
//! [`terraform::TerraformCli`] shell out to the external tools.

pub mod flyctl;
pub mod terraform;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use machines_client::models::{
    CreateMachineResponse, Machine, MachineConfig, MachineState, WaitResponse,
};

use crate::errors::DeployError;

/// Fly Machines API operations used by a deploy
#[async_trait]
pub trait MachinesApi: Send + Sync {
    /// Create a machine and start it. A response without an id means nothing was created.
    async fn create_and_start_machine(
        &self,
        app: &str,
        config: &MachineConfig,
    ) -> Result<CreateMachineResponse, DeployError>;

    /// Block server-side until the machine reaches `state` or `timeout` elapses
    async fn wait_for_machine(
        &self,
        app: &str,
        machine_id: &str,
        timeout: Duration,
        state: MachineState,
    ) -> Result<WaitResponse, DeployError>;

    /// Fetch the machine with its event history
    async fn get_machine(&self, app: &str, machine_id: &str) -> Result<Machine, DeployError>;

    /// Destroy the machine
    async fn delete_machine(&self, app: &str, machine_id: &str) -> Result<(), DeployError>;

    /// Make sure the API is reachable and return its host. Safe to call repeatedly.
    async fn resolve_api_endpoint(&self) -> Result<Option<String>, DeployError>;
}

/// IP address family for allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
}

/// Managed Postgres cluster to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgresRequest {
    pub name: String,
    pub org: String,
    pub region: String,
    pub vm_size: String,
    pub volume_size_gb: u32,
    pub cluster_size: u32,
}

/// Platform CLI operations used by a deploy
#[async_trait]
pub trait PlatformCli: Send + Sync {
    /// Region codes, preferred region first
    async fn list_regions(&self) -> Result<Vec<String>, DeployError>;

    /// Names of secrets already set on the app
    async fn list_secrets(&self, app: &str) -> Result<Vec<String>, DeployError>;

    /// Names of the app's volumes
    async fn list_volumes(&self, app: &str) -> Result<Vec<String>, DeployError>;

    async fn create_volume(
        &self,
        app: &str,
        name: &str,
        region: &str,
        size_gb: u32,
    ) -> Result<(), DeployError>;

    /// Create a managed Postgres cluster, returning the connection string if one was printed
    async fn create_postgres(&self, request: &PostgresRequest) -> Result<Option<String>, DeployError>;

    async fn set_secret(&self, app: &str, name: &str, value: &SecretString) -> Result<(), DeployError>;

    async fn allocate_ip(&self, app: &str, version: IpVersion) -> Result<(), DeployError>;

    /// API token of the logged-in user
    async fn auth_token(&self) -> Result<SecretString, DeployError>;

    /// Organization that owns the app, if the app exists
    async fn app_organization(&self, app: &str) -> Result<Option<String>, DeployError>;
}

/// Declarative infrastructure tool
#[async_trait]
pub trait InfrastructureTool: Send + Sync {
    /// Apply the configuration with the given extra environment
    async fn apply(&self, env: &[(String, SecretString)]) -> Result<(), DeployError>;
}
