//! FSM unit tests

use fly_deployer::deploy::fsm::{DeployEvent, DeployFsm, DeployPhase, DeployVariant};
use fly_deployer::errors::DeployError;

#[test]
fn test_fsm_initial_phase() {
    let fsm = DeployFsm::direct();
    assert_eq!(fsm.phase(), DeployPhase::BuildConfig);
    assert_eq!(fsm.variant(), DeployVariant::Direct);
    assert!(fsm.error().is_none());

    let fsm = DeployFsm::terraform();
    assert_eq!(fsm.phase(), DeployPhase::PatchConfig);
    assert_eq!(fsm.variant(), DeployVariant::Terraform);
}

#[test]
fn test_fsm_start_timeout_flow() {
    let mut fsm = DeployFsm::direct();

    fsm.process(DeployEvent::ConfigBuilt).unwrap();
    fsm.process(DeployEvent::DatabaseReady).unwrap();
    fsm.process(DeployEvent::ReleaseSucceeded).unwrap();

    // StartApp -> TimedOut
    fsm.process(DeployEvent::StartTimedOut).unwrap();
    assert_eq!(fsm.phase(), DeployPhase::TimedOut);
    assert!(fsm.phase().is_terminal());
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_terraform_success_flow() {
    let mut fsm = DeployFsm::terraform();

    fsm.process(DeployEvent::ConfigPatched).unwrap();
    assert_eq!(fsm.phase(), DeployPhase::RunRelease);

    // RunRelease -> Apply for terraform deploys
    fsm.process(DeployEvent::ReleaseSucceeded).unwrap();
    assert_eq!(fsm.phase(), DeployPhase::Apply);

    fsm.process(DeployEvent::Applied).unwrap();
    assert_eq!(fsm.phase(), DeployPhase::Applied);
}

#[test]
fn test_fsm_abort_from_any_running_phase() {
    let mut fsm = DeployFsm::direct();
    fsm.process(DeployEvent::ConfigBuilt).unwrap();

    fsm.process(DeployEvent::Abort("no connection string".to_string()))
        .unwrap();
    assert_eq!(fsm.phase(), DeployPhase::Failed);
    assert_eq!(fsm.error(), Some("no connection string"));
}

#[test]
fn test_fsm_invalid_transitions() {
    let mut fsm = DeployFsm::direct();

    // Can't skip database provisioning
    let result = fsm.process(DeployEvent::ReleaseSucceeded);
    assert!(matches!(result, Err(DeployError::InvalidTransition(_))));
    assert_eq!(fsm.phase(), DeployPhase::BuildConfig);

    // Direct deploys never patch terraform files
    assert!(fsm.process(DeployEvent::ConfigPatched).is_err());

    let mut fsm = DeployFsm::terraform();
    fsm.process(DeployEvent::ConfigPatched).unwrap();
    fsm.process(DeployEvent::ReleaseSucceeded).unwrap();

    // Terraform deploys never start the app themselves
    assert!(fsm.process(DeployEvent::AppStarted).is_err());
}

#[test]
fn test_fsm_terminal_phases_reject_abort() {
    let mut fsm = DeployFsm::terraform();
    fsm.process(DeployEvent::ConfigPatched).unwrap();
    fsm.process(DeployEvent::ReleaseFailed("exit code 1".to_string()))
        .unwrap();

    assert!(fsm.process(DeployEvent::Abort("again".to_string())).is_err());
    assert_eq!(fsm.error(), Some("exit code 1"));
}
