//! Machine lifecycle tests

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use fly_deployer::app::run::allocate_ips;
use fly_deployer::deploy::config::MachineConfigBuilder;
use fly_deployer::deploy::lifecycle::{wait_until, ExitEventPoll, MachineLifecycle, WaitPolicy};
use fly_deployer::errors::{DeployError, MachineRole};
use fly_deployer::platform::IpVersion;
use machines_client::models::{CreateMachineResponse, MachineState};

use crate::fakes::{counting_sleep, exited_machine, running_machine, ApiCall, FakeCli, FakeMachines, APP};

const POLICY: WaitPolicy = WaitPolicy {
    max_attempts: 5,
    timeout: Duration::from_secs(60),
};

fn config() -> machines_client::models::MachineConfig {
    MachineConfigBuilder::new(APP, "registry.fly.io/my-app:1", "iad").build()
}

#[tokio::test]
async fn test_run_to_state_stops_at_kth_attempt() {
    let api = FakeMachines::new();
    api.script_started(&[Some(false), Some(true)]);
    let lifecycle = MachineLifecycle::new(api.clone());

    let outcome = assert_ok!(
        lifecycle
            .run_to_state(APP, &config(), MachineRole::App, MachineState::Started, POLICY)
            .await
    );

    assert!(outcome.reached);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(api.waits_for(MachineState::Started), 2);
    assert!(api.calls().iter().all(|call| match call {
        ApiCall::Wait { timeout, .. } => *timeout == Duration::from_secs(60),
        _ => true,
    }));
}

#[tokio::test]
async fn test_run_to_state_exhausts_budget() {
    let api = FakeMachines::new();
    api.script_started(&[Some(false); 7]);
    let lifecycle = MachineLifecycle::new(api.clone());

    let outcome = assert_ok!(
        lifecycle
            .run_to_state(APP, &config(), MachineRole::App, MachineState::Started, POLICY)
            .await
    );

    assert!(!outcome.reached);
    assert_eq!(outcome.attempts, 5);
    assert_eq!(outcome.machine_id, "m-1");
    assert_eq!(api.waits_for(MachineState::Started), 5);
}

#[tokio::test]
async fn test_start_without_id() {
    let api = FakeMachines::new();
    api.create_responses
        .lock()
        .unwrap()
        .push_back(CreateMachineResponse::default());
    let lifecycle = MachineLifecycle::new(api.clone());

    let result = lifecycle.start(APP, &config(), MachineRole::App).await;
    let err = assert_err!(result);
    assert_eq!(err.to_string(), "Error starting application");
    assert!(matches!(
        err,
        DeployError::MachineCreateFailed {
            role: MachineRole::App,
            ..
        }
    ));
}

#[tokio::test]
async fn test_exit_event_poll() {
    let api = FakeMachines::new();
    api.push_machine(running_machine("m-1"));
    api.push_machine(running_machine("m-1"));
    api.push_machine(exited_machine("m-1", 3));
    let sleeps = Arc::new(AtomicU32::new(0));

    let strategy = ExitEventPoll {
        api: api.as_ref(),
        app: APP,
        machine_id: "m-1",
        interval: Duration::from_secs(1),
        sleep_fn: counting_sleep(sleeps.clone()),
    };
    let report = wait_until(&strategy, 90).await;

    assert!(report.reached);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.last.and_then(|event| event.exit_code()), Some(3));
    assert_eq!(sleeps.load(Ordering::SeqCst), 3);
    assert_eq!(api.gets(), 3);
}

#[tokio::test]
async fn test_delete_best_effort() {
    let api = FakeMachines::new();
    let lifecycle = MachineLifecycle::new(api.clone());

    lifecycle.delete_best_effort(APP, "m-9").await;
    assert_eq!(api.deleted(), vec!["m-9".to_string()]);
}

#[tokio::test]
async fn test_allocate_ips() {
    let cli = FakeCli::default();
    assert_ok!(allocate_ips(APP, &cli, false, false).await);
    assert_eq!(cli.ips.lock().unwrap().clone(), vec![IpVersion::V4, IpVersion::V6]);

    let cli = FakeCli::default();
    assert_ok!(allocate_ips(APP, &cli, false, true).await);
    assert_eq!(cli.ips.lock().unwrap().clone(), vec![IpVersion::V6]);
}
