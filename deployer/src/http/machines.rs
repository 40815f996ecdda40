//! Machines API client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{debug, error};

use machines_client::models::{
    CreateMachineRequest, CreateMachineResponse, Machine, MachineConfig, MachineState, WaitResponse,
};

use crate::errors::DeployError;
use crate::http::client::HttpClient;
use crate::platform::MachinesApi;

/// Headroom over the server-side wait so the server answers before we give up
const WAIT_GRACE: Duration = Duration::from_secs(10);

fn machines_path(app: &str) -> String {
    format!("/v1/apps/{}/machines", app)
}

fn machine_path(app: &str, machine_id: &str) -> String {
    format!("/v1/apps/{}/machines/{}", app, machine_id)
}

/// Parse an error body, keeping non-JSON text as `error`
fn error_details(status: StatusCode, body: &str) -> Map<String, Value> {
    let mut details = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut map = Map::new();
            map.insert("error".to_string(), json!(body));
            map
        }
    };
    details.insert("status".to_string(), json!(status.as_u16()));
    details
}

#[async_trait]
impl MachinesApi for HttpClient {
    async fn create_and_start_machine(
        &self,
        app: &str,
        config: &MachineConfig,
    ) -> Result<CreateMachineResponse, DeployError> {
        let body = CreateMachineRequest::from(config);
        let response = self
            .request(Method::POST, &machines_path(app))
            .await?
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!("Machine create failed: {} - {}", status, text);
            return Ok(CreateMachineResponse {
                id: None,
                details: error_details(status, &text),
            });
        }

        let created: CreateMachineResponse = response.json().await?;
        debug!("Created machine {:?}", created.id);
        Ok(created)
    }

    async fn wait_for_machine(
        &self,
        app: &str,
        machine_id: &str,
        timeout: Duration,
        state: MachineState,
    ) -> Result<WaitResponse, DeployError> {
        let path = format!("{}/wait", machine_path(app, machine_id));
        let response = self
            .request(Method::GET, &path)
            .await?
            .query(&[
                ("timeout", timeout.as_secs().to_string()),
                ("state", state.to_string()),
            ])
            .timeout(timeout + WAIT_GRACE)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::REQUEST_TIMEOUT {
            let text = response.text().await.unwrap_or_default();
            debug!("Wait for {} on {} timed out", state, machine_id);
            return Ok(WaitResponse {
                ok: false,
                details: error_details(status, &text),
            });
        }

        let response = HttpClient::ensure_success("GET", response).await?;
        Ok(response.json().await?)
    }

    async fn get_machine(&self, app: &str, machine_id: &str) -> Result<Machine, DeployError> {
        self.get(&machine_path(app, machine_id)).await
    }

    async fn delete_machine(&self, app: &str, machine_id: &str) -> Result<(), DeployError> {
        self.delete(&machine_path(app, machine_id)).await
    }

    async fn resolve_api_endpoint(&self) -> Result<Option<String>, DeployError> {
        self.endpoint().resolve().await.map(Some)
    }
}
