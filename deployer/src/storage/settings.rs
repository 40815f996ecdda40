//! Settings file management

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Deployer settings, read from `config/fly-deploy.json` when present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub json_logs: bool,

    /// Region used when the region listing fails or is empty
    #[serde(default = "default_region")]
    pub default_region: String,

    /// Command run by the release machine
    #[serde(default = "default_release_command")]
    pub release_command: String,

    /// Platform CLI executable
    #[serde(default = "default_flyctl")]
    pub flyctl: String,

    /// Infrastructure tool executable
    #[serde(default = "default_terraform")]
    pub terraform: String,

    /// Machines API endpoint (host:port); resolved automatically when unset
    #[serde(default)]
    pub api_endpoint: Option<String>,

    /// Wait policy for the release machine (direct deploys)
    #[serde(default)]
    pub release_wait: WaitSettings,

    /// Wait policy for the application machine (direct deploys)
    #[serde(default)]
    pub start_wait: WaitSettings,

    /// Poll policy for the release machine (terraform deploys)
    #[serde(default)]
    pub release_poll: PollSettings,

    /// Database provisioning
    #[serde(default)]
    pub database: DatabaseSettings,
}

fn default_region() -> String {
    "iad".to_string()
}

fn default_release_command() -> String {
    "bin/rails fly:release".to_string()
}

fn default_flyctl() -> String {
    "flyctl".to_string()
}

fn default_terraform() -> String {
    "terraform".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            json_logs: false,
            default_region: default_region(),
            release_command: default_release_command(),
            flyctl: default_flyctl(),
            terraform: default_terraform(),
            api_endpoint: None,
            release_wait: WaitSettings::default(),
            start_wait: WaitSettings::default(),
            release_poll: PollSettings::default(),
            database: DatabaseSettings::default(),
        }
    }
}

/// Server-side blocking wait: attempts x per-attempt timeout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitSettings {
    #[serde(default = "default_wait_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_wait_timeout")]
    pub timeout_secs: u64,
}

fn default_wait_attempts() -> u32 {
    5
}

fn default_wait_timeout() -> u64 {
    60
}

impl WaitSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_wait_attempts(),
            timeout_secs: default_wait_timeout(),
        }
    }
}

/// Local fixed-interval polling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_poll_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
}

fn default_poll_attempts() -> u32 {
    90
}

fn default_poll_interval() -> u64 {
    1
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_poll_attempts(),
            interval_secs: default_poll_interval(),
        }
    }
}

/// Sizing for provisioned databases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Size of the sqlite volume in GB
    #[serde(default = "default_volume_size")]
    pub volume_size_gb: u32,

    #[serde(default = "default_postgres_vm_size")]
    pub postgres_vm_size: String,

    #[serde(default = "default_one")]
    pub postgres_volume_size_gb: u32,

    #[serde(default = "default_one")]
    pub postgres_cluster_size: u32,
}

fn default_volume_size() -> u32 {
    3
}

fn default_postgres_vm_size() -> String {
    "shared-cpu-1x".to_string()
}

fn default_one() -> u32 {
    1
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            volume_size_gb: default_volume_size(),
            postgres_vm_size: default_postgres_vm_size(),
            postgres_volume_size_gb: default_one(),
            postgres_cluster_size: default_one(),
        }
    }
}

/// Read settings from `file`, or defaults when it does not exist
pub async fn load_settings(file: &File) -> Result<Settings, DeployError> {
    if file.exists().await {
        file.read_json().await
    } else {
        Ok(Settings::default())
    }
}
