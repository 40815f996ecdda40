//! Error types for the deployer

use thiserror::Error;

use machines_client::models::{MachineEvent, WaitResponse};

/// Which machine a lifecycle step was acting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineRole {
    Release,
    App,
}

impl std::fmt::Display for MachineRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineRole::Release => f.write_str("release machine"),
            MachineRole::App => f.write_str("application"),
        }
    }
}

/// Main error type for the deployer
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("HCL error: {0}")]
    HclError(#[from] hcl::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Error starting {role}")]
    MachineCreateFailed {
        role: MachineRole,
        response: serde_json::Value,
    },

    #[error("Release machine {machine_id} did not stop after {attempts} attempts")]
    ReleaseTimedOut {
        machine_id: String,
        attempts: u32,
        last_status: Option<WaitResponse>,
    },

    #[error("Error performing release")]
    ReleaseFailed {
        machine_id: String,
        exit_code: Option<i64>,
        event: Option<MachineEvent>,
    },

    #[error("Command error: {0}")]
    CommandError(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Terraform error: {0}")]
    TerraformError(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

impl DeployError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Extra state printed to stderr before aborting
    pub fn diagnostics(&self) -> Option<String> {
        match self {
            DeployError::MachineCreateFailed { response, .. } => {
                Some(serde_json::to_string_pretty(response).unwrap_or_else(|_| response.to_string()))
            }
            DeployError::ReleaseTimedOut { last_status, .. } => {
                let status = serde_json::to_string(last_status).unwrap_or_default();
                Some(status)
            }
            DeployError::ReleaseFailed {
                machine_id,
                exit_code,
                event,
            } => {
                let detail = match (exit_code, event) {
                    (Some(code), _) => format!("{{exit_code: {}}}", code),
                    (None, Some(event)) => format!("{:?}", event),
                    (None, None) => "nil".to_string(),
                };
                Some(format!(
                    "{}\nrun 'flyctl logs --instance {}' for more information",
                    detail, machine_id
                ))
            }
            _ => None,
        }
    }
}
