//! Finite state machine for a single deployment

use serde::{Deserialize, Serialize};

/// Deployment state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum DeploymentState {
    /// Waiting in the durable queue for a build slot
    Queued,

    /// Holding a slot; sandbox build in progress
    Building,

    /// Build output verified, upload in progress
    Publishing,

    /// Published under the given id
    Published { id: String },

    /// Terminal failure
    Failed { message: String },
}

impl DeploymentState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentState::Published { .. } | DeploymentState::Failed { .. })
    }
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// A build slot was granted
    Admit,

    /// Sandbox build finished and the entry point exists
    BuildSucceeded,

    /// Publisher returned an id
    Published(String),

    /// Any terminal error
    Fail(String),
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentState,
}

impl DeploymentFsm {
    /// Create a new FSM in the queued state
    pub fn new() -> Self {
        Self {
            state: DeploymentState::Queued,
        }
    }

    /// Get current state
    pub fn state(&self) -> &DeploymentState {
        &self.state
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<(), String> {
        let new_state = match (&self.state, event) {
            (DeploymentState::Queued, DeploymentEvent::Admit) => DeploymentState::Building,
            (DeploymentState::Building, DeploymentEvent::BuildSucceeded) => {
                DeploymentState::Publishing
            }
            (DeploymentState::Publishing, DeploymentEvent::Published(id)) => {
                DeploymentState::Published { id }
            }
            (state, DeploymentEvent::Fail(message)) if !state.is_terminal() => {
                DeploymentState::Failed { message }
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
