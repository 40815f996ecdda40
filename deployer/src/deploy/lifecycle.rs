//! Machine lifecycle: create, then wait for a target state within a bounded budget

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use machines_client::models::{MachineConfig, MachineEvent, MachineState, WaitResponse};

use crate::errors::{DeployError, MachineRole};
use crate::platform::MachinesApi;

/// Result of a single probe
#[derive(Debug, Clone, PartialEq)]
pub enum Probe<T> {
    /// Condition met
    Ready(T),

    /// Not yet; carries the status observed, if any
    Pending(Option<T>),
}

/// How one attempt of a wait loop checks on a machine
#[async_trait]
pub trait WaitStrategy: Send + Sync {
    type Status: Send;

    async fn probe(&self, attempt: u32) -> Probe<Self::Status>;
}

/// Outcome of [`wait_until`]
#[derive(Debug, Clone, PartialEq)]
pub struct WaitReport<T> {
    pub attempts: u32,
    pub reached: bool,
    /// Status from the last probe that reported one
    pub last: Option<T>,
}

/// Probe up to `max_attempts` times, stopping at the first ready probe
pub async fn wait_until<W: WaitStrategy>(strategy: &W, max_attempts: u32) -> WaitReport<W::Status> {
    let mut last = None;

    for attempt in 1..=max_attempts {
        match strategy.probe(attempt).await {
            Probe::Ready(status) => {
                return WaitReport {
                    attempts: attempt,
                    reached: true,
                    last: Some(status),
                };
            }
            Probe::Pending(status) => {
                if status.is_some() {
                    last = status;
                }
            }
        }
    }

    WaitReport {
        attempts: max_attempts,
        reached: false,
        last,
    }
}

/// Each attempt blocks server-side until the machine reaches `target` or `timeout` passes
pub struct ServerWait<'a> {
    pub api: &'a dyn MachinesApi,
    pub app: &'a str,
    pub machine_id: &'a str,
    pub target: MachineState,
    pub timeout: Duration,
}

#[async_trait]
impl<'a> WaitStrategy for ServerWait<'a> {
    type Status = WaitResponse;

    async fn probe(&self, attempt: u32) -> Probe<WaitResponse> {
        debug!(
            "Waiting up to {:?} for {} to be {} (attempt {})",
            self.timeout, self.machine_id, self.target, attempt
        );
        match self
            .api
            .wait_for_machine(self.app, self.machine_id, self.timeout, self.target)
            .await
        {
            Ok(status) if status.ok => Probe::Ready(status),
            Ok(status) => Probe::Pending(Some(status)),
            Err(e) => {
                warn!("Wait for {} failed: {}", self.machine_id, e);
                Probe::Pending(None)
            }
        }
    }
}

/// Each attempt sleeps, then fetches the machine and looks for an `exit` event
pub struct ExitEventPoll<'a, S> {
    pub api: &'a dyn MachinesApi,
    pub app: &'a str,
    pub machine_id: &'a str,
    pub interval: Duration,
    pub sleep_fn: S,
}

#[async_trait]
impl<'a, S, F> WaitStrategy for ExitEventPoll<'a, S>
where
    S: Fn(Duration) -> F + Send + Sync,
    F: Future<Output = ()> + Send + 'static,
{
    type Status = MachineEvent;

    async fn probe(&self, attempt: u32) -> Probe<MachineEvent> {
        (self.sleep_fn)(self.interval).await;

        match self.api.get_machine(self.app, self.machine_id).await {
            Ok(machine) => match machine.latest_event() {
                Some(event) if event.is_exit() => {
                    let at = event
                        .timestamp
                        .and_then(DateTime::<Utc>::from_timestamp_millis)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "unknown time".to_string());
                    info!("Release {} exited at {} (attempt {})", self.machine_id, at, attempt);
                    Probe::Ready(event.clone())
                }
                event => {
                    debug!(
                        "Release {} still running (attempt {}, state {})",
                        self.machine_id, attempt, machine.state
                    );
                    Probe::Pending(event.cloned())
                }
            },
            Err(e) => {
                warn!("Fetching {} failed: {}", self.machine_id, e);
                Probe::Pending(None)
            }
        }
    }
}

/// Bounded server-side wait policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
}

/// Outcome of [`MachineLifecycle::run_to_state`]
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub machine_id: String,
    pub reached: bool,
    pub attempts: u32,
    pub last_status: Option<WaitResponse>,
}

/// Terminal result of a release machine: its id and exit code, if it exited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOutcome {
    pub machine_id: String,
    pub exit_code: Option<i64>,
}

/// Create/start/wait/delete against the Machines API
pub struct MachineLifecycle {
    api: Arc<dyn MachinesApi>,
}

impl MachineLifecycle {
    pub fn new(api: Arc<dyn MachinesApi>) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &dyn MachinesApi {
        self.api.as_ref()
    }

    /// Create and start a machine. No id in the response is fatal.
    pub async fn start(
        &self,
        app: &str,
        config: &MachineConfig,
        role: MachineRole,
    ) -> Result<String, DeployError> {
        let response = self.api.create_and_start_machine(app, config).await?;

        match response.id {
            Some(id) => {
                info!("Started {} {}", role, id);
                Ok(id)
            }
            None => Err(DeployError::MachineCreateFailed {
                role,
                response: serde_json::to_value(&response.details)?,
            }),
        }
    }

    /// Start a machine, then wait for `target` at most `policy.max_attempts` times
    pub async fn run_to_state(
        &self,
        app: &str,
        config: &MachineConfig,
        role: MachineRole,
        target: MachineState,
        policy: WaitPolicy,
    ) -> Result<RunOutcome, DeployError> {
        let machine_id = self.start(app, config, role).await?;

        let strategy = ServerWait {
            api: self.api.as_ref(),
            app,
            machine_id: &machine_id,
            target,
            timeout: policy.timeout,
        };
        let report = wait_until(&strategy, policy.max_attempts).await;

        if report.reached {
            info!("{} {} is {} after {} attempt(s)", role, machine_id, target, report.attempts);
        } else {
            warn!(
                "{} {} did not reach {} after {} attempt(s)",
                role, machine_id, target, report.attempts
            );
        }

        Ok(RunOutcome {
            machine_id,
            reached: report.reached,
            attempts: report.attempts,
            last_status: report.last,
        })
    }

    /// Delete a machine, logging instead of failing
    pub async fn delete_best_effort(&self, app: &str, machine_id: &str) {
        match self.api.delete_machine(app, machine_id).await {
            Ok(()) => debug!("Deleted machine {}", machine_id),
            Err(e) => warn!("Unable to delete machine {}: {}", machine_id, e),
        }
    }
}
