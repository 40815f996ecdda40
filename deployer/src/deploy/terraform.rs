//! Terraform deploys: patch `main.tf`, run the release machine from its
//! `fly_machine` resource, then hand off to `terraform apply`.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use secrecy::SecretString;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use machines_client::models::{GuestConfig, MachineConfig, MachineSpec};

use crate::app::state::DeployContext;
use crate::deploy::config::SERVER_COMMAND;
use crate::deploy::fsm::{DeployEvent, DeployFsm};
use crate::deploy::lifecycle::{wait_until, ExitEventPoll, MachineLifecycle, ReleaseOutcome};
use crate::errors::{DeployError, MachineRole};
use crate::platform::flyctl::say_status;
use crate::platform::{InfrastructureTool, MachinesApi, PlatformCli};

/// Resource type of a platform machine in the terraform provider
pub const MACHINE_RESOURCE: &str = "fly_machine";

/// Attributes that only mean something to terraform
const TERRAFORM_ONLY_KEYS: [&str; 7] = [
    "services",
    "for_each",
    "region",
    "app",
    "name",
    "depends_on",
    "mounts",
];

static IMAGE_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*image\s*=\s*"(.*?)""#).expect("valid image pattern"));

/// Replace the literal of the first `image = "..."` line. `None` when there is no such line.
pub fn substitute_image(source: &str, image: &str) -> Option<String> {
    let literal = IMAGE_LINE.captures(source)?.get(1)?;
    Some(format!(
        "{}{}{}",
        &source[..literal.start()],
        image,
        &source[literal.end()..]
    ))
}

/// A `resource "<kind>" "<name>"` block, flattened into JSON attributes
#[derive(Debug, Clone, PartialEq)]
pub struct TerraformResource {
    pub kind: String,
    pub name: String,
    attributes: Map<String, Value>,
}

impl TerraformResource {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            attributes,
        }
    }

    /// First resource of `kind` in an HCL document
    pub fn parse(source: &str, kind: &str) -> Result<Self, DeployError> {
        let body = hcl::parse(source)?;

        let block = body
            .blocks()
            .find(|block| {
                block.identifier() == "resource"
                    && block.labels().first().map(|l| l.as_str()) == Some(kind)
            })
            .ok_or_else(|| DeployError::ConfigError(format!("No {} resource found", kind)))?;

        let name = block
            .labels()
            .get(1)
            .map(|l| l.as_str().to_string())
            .unwrap_or_default();
        // non-literal expressions (function calls, traversals) keep their source form as strings
        let mut attributes = Map::new();
        for attr in block.body().attributes() {
            let value = hcl::Value::from(attr.expr().clone());
            attributes.insert(attr.key().to_string(), serde_json::to_value(value)?);
        }
        debug!("Found resource {}.{} with {} attributes", kind, name, attributes.len());

        Ok(Self::new(kind, name, attributes))
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.attributes.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }

    /// Config for a release machine built from this resource
    pub fn to_release_config(&self, app: &str, release_command: &str) -> Result<MachineConfig, DeployError> {
        let mut attrs = self.clone();
        for key in TERRAFORM_ONLY_KEYS {
            attrs.remove(key);
        }

        let guest = GuestConfig {
            cpus: attrs.remove("cpus").as_ref().and_then(as_u32),
            memory_mb: attrs.remove("memorymb").as_ref().and_then(as_u32),
            cpu_kind: attrs
                .remove("cputype")
                .and_then(|v| v.as_str().map(str::to_string)),
        };

        let image = attrs
            .remove("image")
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| {
                DeployError::ConfigError(format!("{}.{} has no image", self.kind, self.name))
            })?;

        let mut env: BTreeMap<String, String> = match attrs.remove("env") {
            Some(Value::Object(vars)) => vars
                .into_iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect(),
            _ => BTreeMap::new(),
        };
        env.insert(SERVER_COMMAND.to_string(), release_command.to_string());

        Ok(MachineConfig {
            app: app.to_string(),
            region: None,
            name: None,
            spec: MachineSpec {
                image,
                guest,
                services: Vec::new(),
                mounts: Vec::new(),
                env,
                extra: attrs.attributes,
            },
        })
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Drives a terraform deploy
pub struct TerraformConfigPatcher {
    ctx: Arc<DeployContext>,
    cli: Arc<dyn PlatformCli>,
    tool: Arc<dyn InfrastructureTool>,
    lifecycle: MachineLifecycle,
}

impl TerraformConfigPatcher {
    pub fn new(
        ctx: Arc<DeployContext>,
        api: Arc<dyn MachinesApi>,
        cli: Arc<dyn PlatformCli>,
        tool: Arc<dyn InfrastructureTool>,
    ) -> Self {
        Self {
            ctx,
            cli,
            tool,
            lifecycle: MachineLifecycle::new(api),
        }
    }

    /// Point `main.tf` at `image` and return the release config derived from it
    pub async fn patch(&self, image: &str) -> Result<MachineConfig, DeployError> {
        let file = self.ctx.layout.main_tf();
        let source = file.read_string().await?;

        let patched = substitute_image(&source, image.trim()).ok_or_else(|| {
            DeployError::ConfigError(format!("No image attribute in {}", file.path().display()))
        })?;
        if patched != source {
            info!("Updating image in {} to {}", file.path().display(), image.trim());
            file.write_string(&patched).await?;
        }

        let resource = TerraformResource::parse(&patched, MACHINE_RESOURCE)?;
        resource.to_release_config(&self.ctx.app, &self.ctx.settings.release_command)
    }

    /// Run the release machine until it exits, sleeping with `sleep_fn` between polls
    pub async fn release<S, F>(
        &self,
        config: &MachineConfig,
        sleep_fn: S,
    ) -> Result<ReleaseOutcome, DeployError>
    where
        S: Fn(Duration) -> F + Send + Sync,
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.ctx.app.as_str();
        let command = config.spec.env.get(SERVER_COMMAND).map(String::as_str);
        say_status("fly", command.unwrap_or("release"));
        let machine_id = self.lifecycle.start(app, config, MachineRole::Release).await?;

        let poll = &self.ctx.settings.release_poll;
        let strategy = ExitEventPoll {
            api: self.lifecycle.api(),
            app,
            machine_id: &machine_id,
            interval: poll.interval(),
            sleep_fn,
        };
        let report = wait_until(&strategy, poll.max_attempts).await;

        let exit_code = report
            .last
            .as_ref()
            .filter(|event| event.is_exit())
            .and_then(|event| event.exit_code());

        if exit_code == Some(0) {
            info!("Release {} exited successfully", machine_id);
            return Ok(ReleaseOutcome {
                machine_id,
                exit_code,
            });
        }

        Err(DeployError::ReleaseFailed {
            machine_id,
            exit_code,
            event: report.last,
        })
    }

    /// Patch, release, and on a clean exit hand off to `terraform apply`
    pub async fn deploy<S, F>(&self, image: &str, sleep_fn: S) -> Result<ReleaseOutcome, DeployError>
    where
        S: Fn(Duration) -> F + Send + Sync,
        F: Future<Output = ()> + Send + 'static,
    {
        let mut fsm = DeployFsm::terraform();
        let result = self.run(&mut fsm, image, sleep_fn).await;

        if let Err(e) = &result {
            if !fsm.phase().is_terminal() {
                fsm.process(DeployEvent::Abort(e.to_string()))?;
            }
            error!("Terraform deploy of {} failed in {:?}: {}", self.ctx.app, fsm.phase(), e);
        }
        result
    }

    async fn run<S, F>(&self, fsm: &mut DeployFsm, image: &str, sleep_fn: S) -> Result<ReleaseOutcome, DeployError>
    where
        S: Fn(Duration) -> F + Send + Sync,
        F: Future<Output = ()> + Send + 'static,
    {
        let release_config = self.patch(image).await?;
        fsm.process(DeployEvent::ConfigPatched)?;

        let endpoint = self.lifecycle.api().resolve_api_endpoint().await?;

        let outcome = match self.release(&release_config, sleep_fn).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // the release machine is kept for `flyctl logs`
                fsm.process(DeployEvent::ReleaseFailed(e.to_string()))?;
                return Err(e);
            }
        };
        fsm.process(DeployEvent::ReleaseSucceeded)?;

        self.lifecycle
            .delete_best_effort(&self.ctx.app, &outcome.machine_id)
            .await;

        let mut env = vec![("FLY_API_TOKEN".to_string(), self.cli.auth_token().await?)];
        if let Some(endpoint) = endpoint {
            env.push(("FLY_HTTP_ENDPOINT".to_string(), SecretString::from(endpoint)));
        }
        self.tool.apply(&env).await?;
        fsm.process(DeployEvent::Applied)?;

        Ok(outcome)
    }
}
