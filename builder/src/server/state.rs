//! Server state

use crate::coordinator::DeploymentCoordinator;
use crate::github::push::TriggerPolicy;

/// Server state shared across handlers
pub struct ServerState {
    pub coordinator: DeploymentCoordinator,

    /// Gateway base URL used to build links to published sites
    pub gateway_url: String,

    pub trigger: TriggerPolicy,
}

impl ServerState {
    pub fn new(
        coordinator: DeploymentCoordinator,
        gateway_url: &str,
        trigger: TriggerPolicy,
    ) -> Self {
        Self {
            coordinator,
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            trigger,
        }
    }

    /// Public URL of a published id
    pub fn site_url(&self, id: &str) -> String {
        format!("{}/{}", self.gateway_url, id)
    }
}
