//! API models

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Guest resources allocated to a machine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u32>,
}

/// Public port exposed by a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub port: u16,
    #[serde(default)]
    pub handlers: Vec<String>,
}

/// Network service routed to the machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub ports: Vec<Port>,
    pub protocol: String,
    pub internal_port: u16,
}

/// Volume mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub volume: String,
    pub path: String,
}

/// The `config` object of a machine.
///
/// Attributes without a typed field are preserved in `extra` and sent as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineSpec {
    pub image: String,

    #[serde(default)]
    pub guest: GuestConfig,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Service>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A machine to create: placement plus its config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub app: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub spec: MachineSpec,
}

/// Body of `POST /v1/apps/{app}/machines`
#[derive(Debug, Clone, Serialize)]
pub struct CreateMachineRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<&'a str>,

    pub config: &'a MachineSpec,
}

impl<'a> From<&'a MachineConfig> for CreateMachineRequest<'a> {
    fn from(config: &'a MachineConfig) -> Self {
        Self {
            name: config.name.as_deref(),
            region: config.region.as_deref(),
            config: &config.spec,
        }
    }
}

/// Response to a create request. A missing `id` means the machine was not created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateMachineResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Response to a wait request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitResponse {
    #[serde(default)]
    pub ok: bool,

    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// Machine lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    Created,
    Starting,
    Started,
    Stopping,
    Stopped,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

impl MachineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Created => "created",
            MachineState::Starting => "starting",
            MachineState::Started => "started",
            MachineState::Stopping => "stopping",
            MachineState::Stopped => "stopped",
            MachineState::Failed => "failed",
            MachineState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exit details attached to an `exit` event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitEvent {
    #[serde(default, alias = "exitCode")]
    pub exit_code: Option<i64>,
}

/// Request payload of a machine event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRequest {
    #[serde(default, alias = "exitEvent", skip_serializing_if = "Option::is_none")]
    pub exit_event: Option<ExitEvent>,
}

/// Machine lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineEvent {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<EventRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl MachineEvent {
    pub fn is_exit(&self) -> bool {
        self.kind == "exit"
    }

    pub fn exit_code(&self) -> Option<i64> {
        self.request
            .as_ref()
            .and_then(|r| r.exit_event.as_ref())
            .and_then(|e| e.exit_code)
    }
}

/// Machine as returned by `GET /v1/apps/{app}/machines/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,

    #[serde(default)]
    pub state: MachineState,

    /// Most recent event first
    #[serde(default)]
    pub events: Vec<MachineEvent>,
}

impl Machine {
    pub fn latest_event(&self) -> Option<&MachineEvent> {
        self.events.first()
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
