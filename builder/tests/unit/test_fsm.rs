//! FSM unit tests

use permadeploy::deploy::fsm::{DeploymentEvent, DeploymentFsm, DeploymentState};
use tokio_test::{assert_err, assert_ok};

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.state(), &DeploymentState::Queued);
    assert!(!fsm.state().is_terminal());
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = DeploymentFsm::new();

    // Queued -> Publishing is not allowed
    assert_err!(fsm.process(DeploymentEvent::BuildSucceeded));
    assert_eq!(fsm.state(), &DeploymentState::Queued);
}

#[test]
fn test_fsm_state_serialization() {
    let mut fsm = DeploymentFsm::new();
    assert_eq!(
        serde_json::to_value(fsm.state()).unwrap(),
        serde_json::json!({ "state": "queued" })
    );

    assert_ok!(fsm.process(DeploymentEvent::Admit));
    assert_ok!(fsm.process(DeploymentEvent::Fail(
        "index.html does not exist in build".to_string()
    )));
    assert_eq!(
        serde_json::to_value(fsm.state()).unwrap(),
        serde_json::json!({
            "state": "failed",
            "message": "index.html does not exist in build"
        })
    );
}

#[test]
fn test_fsm_published_state_roundtrip() {
    let state = DeploymentState::Published {
        id: "manifest-id".to_string(),
    };
    let json = serde_json::to_string(&state).unwrap();
    let parsed: DeploymentState = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, state);
    assert!(parsed.is_terminal());
}
