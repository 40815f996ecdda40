//! In-memory platform fakes that record every call

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use fly_deployer::app::state::DeployContext;
use fly_deployer::errors::DeployError;
use fly_deployer::platform::{InfrastructureTool, IpVersion, MachinesApi, PlatformCli, PostgresRequest};
use fly_deployer::storage::layout::ProjectLayout;
use fly_deployer::storage::settings::Settings;
use machines_client::models::{
    CreateMachineResponse, Machine, MachineConfig, MachineState, WaitResponse,
};

pub const APP: &str = "my-app";
pub const ENDPOINT: &str = "127.0.0.1:4280";
pub const TOKEN: &str = "test-token";

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Create(MachineConfig),
    Wait {
        machine_id: String,
        state: MachineState,
        timeout: Duration,
    },
    Get(String),
    Delete(String),
    Resolve,
}

/// Scripted Machines API. Wait scripts hold `Some(ok)` or `None` for a transport error;
/// an exhausted script answers `ok: true`.
#[derive(Default)]
pub struct FakeMachines {
    pub calls: Mutex<Vec<ApiCall>>,
    pub create_responses: Mutex<VecDeque<CreateMachineResponse>>,
    pub stopped_waits: Mutex<VecDeque<Option<bool>>>,
    pub started_waits: Mutex<VecDeque<Option<bool>>>,
    pub machines: Mutex<VecDeque<Machine>>,
    next_id: AtomicU32,
}

impl FakeMachines {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_stopped(&self, script: &[Option<bool>]) {
        self.stopped_waits.lock().unwrap().extend(script.iter().copied());
    }

    pub fn script_started(&self, script: &[Option<bool>]) {
        self.started_waits.lock().unwrap().extend(script.iter().copied());
    }

    pub fn push_machine(&self, machine: Machine) {
        self.machines.lock().unwrap().push_back(machine);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<MachineConfig> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Create(config) => Some(config),
                _ => None,
            })
            .collect()
    }

    pub fn waits_for(&self, state: MachineState) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ApiCall::Wait { state: s, .. } if *s == state))
            .count()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn gets(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, ApiCall::Get(_)))
            .count()
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MachinesApi for FakeMachines {
    async fn create_and_start_machine(
        &self,
        _app: &str,
        config: &MachineConfig,
    ) -> Result<CreateMachineResponse, DeployError> {
        self.record(ApiCall::Create(config.clone()));

        if let Some(response) = self.create_responses.lock().unwrap().pop_front() {
            return Ok(response);
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreateMachineResponse {
            id: Some(format!("m-{}", n)),
            ..Default::default()
        })
    }

    async fn wait_for_machine(
        &self,
        _app: &str,
        machine_id: &str,
        timeout: Duration,
        state: MachineState,
    ) -> Result<WaitResponse, DeployError> {
        self.record(ApiCall::Wait {
            machine_id: machine_id.to_string(),
            state,
            timeout,
        });

        let script = match state {
            MachineState::Stopped => &self.stopped_waits,
            _ => &self.started_waits,
        };
        match script.lock().unwrap().pop_front() {
            Some(Some(ok)) => Ok(WaitResponse {
                ok,
                ..Default::default()
            }),
            Some(None) => Err(DeployError::ApiError("connection reset".to_string())),
            None => Ok(WaitResponse {
                ok: true,
                ..Default::default()
            }),
        }
    }

    async fn get_machine(&self, _app: &str, machine_id: &str) -> Result<Machine, DeployError> {
        self.record(ApiCall::Get(machine_id.to_string()));

        Ok(self.machines.lock().unwrap().pop_front().unwrap_or_else(|| Machine {
            id: machine_id.to_string(),
            state: MachineState::Started,
            events: Vec::new(),
        }))
    }

    async fn delete_machine(&self, _app: &str, machine_id: &str) -> Result<(), DeployError> {
        self.record(ApiCall::Delete(machine_id.to_string()));
        Ok(())
    }

    async fn resolve_api_endpoint(&self) -> Result<Option<String>, DeployError> {
        self.record(ApiCall::Resolve);
        Ok(Some(ENDPOINT.to_string()))
    }
}

/// Machine whose latest event is an exit with `exit_code`
pub fn exited_machine(id: &str, exit_code: i64) -> Machine {
    serde_json::from_value(json!({
        "id": id,
        "state": "stopped",
        "events": [
            {
                "type": "exit",
                "status": "stopped",
                "request": {"exit_event": {"exit_code": exit_code}},
                "timestamp": 1_700_000_000_000i64
            },
            {"type": "start", "status": "started", "timestamp": 1_699_999_990_000i64}
        ]
    }))
    .unwrap()
}

/// Machine that is still running its release command
pub fn running_machine(id: &str) -> Machine {
    serde_json::from_value(json!({
        "id": id,
        "state": "started",
        "events": [{"type": "start", "status": "started"}]
    }))
    .unwrap()
}

/// Scripted platform CLI
pub struct FakeCli {
    pub calls: Mutex<Vec<String>>,
    /// `None` makes the region listing fail
    pub regions: Option<Vec<String>>,
    pub secrets: Vec<String>,
    pub volumes: Mutex<Vec<String>>,
    pub postgres_url: Option<String>,
    pub postgres_requests: Mutex<Vec<PostgresRequest>>,
    pub secrets_set: Mutex<Vec<(String, String)>>,
    pub ips: Mutex<Vec<IpVersion>>,
    pub org: Option<String>,
}

impl Default for FakeCli {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            regions: Some(vec!["ord".to_string(), "iad".to_string()]),
            secrets: Vec::new(),
            volumes: Mutex::new(Vec::new()),
            postgres_url: None,
            postgres_requests: Mutex::new(Vec::new()),
            secrets_set: Mutex::new(Vec::new()),
            ips: Mutex::new(Vec::new()),
            org: Some("acme".to_string()),
        }
    }
}

impl FakeCli {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl PlatformCli for FakeCli {
    async fn list_regions(&self) -> Result<Vec<String>, DeployError> {
        self.record("regions list");
        self.regions
            .clone()
            .ok_or_else(|| DeployError::CommandError("flyctl regions list exited with 1".to_string()))
    }

    async fn list_secrets(&self, app: &str) -> Result<Vec<String>, DeployError> {
        self.record(format!("secrets list {}", app));
        Ok(self.secrets.clone())
    }

    async fn list_volumes(&self, app: &str) -> Result<Vec<String>, DeployError> {
        self.record(format!("volumes list {}", app));
        Ok(self.volumes.lock().unwrap().clone())
    }

    async fn create_volume(
        &self,
        app: &str,
        name: &str,
        region: &str,
        size_gb: u32,
    ) -> Result<(), DeployError> {
        self.record(format!("volumes create {} {} {} {}", name, app, region, size_gb));
        self.volumes.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn create_postgres(&self, request: &PostgresRequest) -> Result<Option<String>, DeployError> {
        self.record(format!("postgres create {}", request.name));
        self.postgres_requests.lock().unwrap().push(request.clone());
        Ok(self.postgres_url.clone())
    }

    async fn set_secret(&self, app: &str, name: &str, value: &SecretString) -> Result<(), DeployError> {
        self.record(format!("secrets set {} {}", name, app));
        self.secrets_set
            .lock()
            .unwrap()
            .push((name.to_string(), value.expose_secret().to_string()));
        Ok(())
    }

    async fn allocate_ip(&self, app: &str, version: IpVersion) -> Result<(), DeployError> {
        self.record(format!("ips allocate {:?} {}", version, app));
        self.ips.lock().unwrap().push(version);
        Ok(())
    }

    async fn auth_token(&self) -> Result<SecretString, DeployError> {
        self.record("auth token");
        Ok(SecretString::from(TOKEN))
    }

    async fn app_organization(&self, app: &str) -> Result<Option<String>, DeployError> {
        self.record(format!("apps list {}", app));
        match &self.org {
            Some(org) => Ok(Some(org.clone())),
            None => Err(DeployError::CommandError("flyctl apps list exited with 1".to_string())),
        }
    }
}

/// Records the environment of every apply
#[derive(Default)]
pub struct FakeTool {
    pub applies: Mutex<Vec<Vec<(String, String)>>>,
    pub fail: bool,
}

#[async_trait]
impl InfrastructureTool for FakeTool {
    async fn apply(&self, env: &[(String, SecretString)]) -> Result<(), DeployError> {
        self.applies.lock().unwrap().push(
            env.iter()
                .map(|(k, v)| (k.clone(), v.expose_secret().to_string()))
                .collect(),
        );
        if self.fail {
            return Err(DeployError::TerraformError("terraform apply exited with 1".to_string()));
        }
        Ok(())
    }
}

/// Context for `APP` rooted at `root`
pub fn context(root: &std::path::Path, settings: Settings) -> Arc<DeployContext> {
    Arc::new(DeployContext::new(APP, "personal", ProjectLayout::new(root), settings))
}

/// Sleep that returns immediately and counts its calls
pub fn counting_sleep(counter: Arc<AtomicU32>) -> impl Fn(Duration) -> std::future::Ready<()> + Send + Sync {
    move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        std::future::ready(())
    }
}
