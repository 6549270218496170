//! Controller-manager service seam.
//!
//! The low-level robot controller (torque vs. position) is switched through
//! a request/response service owned by the robot middleware.  The bridge
//! never talks to that middleware directly: it holds something implementing
//! [`ControllerManager`] and the adapter translates each call into the
//! concrete protocol.
//!
//! [`SimControllerManager`] is the in-process implementation used for
//! headless runs and tests.

use async_trait::async_trait;
use simlink_types::BridgeError;
use tokio::sync::Mutex;

/// How strictly the controller manager must honour a switch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    BestEffort = 1,
    Strict = 2,
}

/// Request to start some controllers and stop others in one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchRequest {
    pub start: Vec<String>,
    pub stop: Vec<String>,
    pub strictness: Strictness,
    pub start_asap: bool,
}

/// Every controller-manager adapter must implement this trait.
///
/// # Contract
///
/// * `load_controller` – ask the manager to load `name` so it can be started.
/// * `wait_for_switch_service` – resolve once the switch service is reachable.
///   Callers bound this wait themselves.
/// * `switch_controller` – perform the switch; `Ok(false)` means the service
///   answered and refused.
#[async_trait]
pub trait ControllerManager: Send + Sync {
    async fn load_controller(&self, name: &str) -> Result<bool, BridgeError>;

    async fn wait_for_switch_service(&self) -> Result<(), BridgeError>;

    async fn switch_controller(&self, request: &SwitchRequest) -> Result<bool, BridgeError>;
}

/// Canned behaviour of a [`SimControllerManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimServiceBehaviour {
    Accept,
    Reject,
    /// The switch service never comes up.
    Unreachable,
    /// No call is ever answered, not even the load request.
    Unresponsive,
}

/// In-process controller manager that records every request it receives.
pub struct SimControllerManager {
    behaviour: SimServiceBehaviour,
    loaded: Mutex<Vec<String>>,
    requests: Mutex<Vec<SwitchRequest>>,
}

impl SimControllerManager {
    pub fn new(behaviour: SimServiceBehaviour) -> Self {
        Self {
            behaviour,
            loaded: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub async fn loaded(&self) -> Vec<String> {
        self.loaded.lock().await.clone()
    }

    pub async fn requests(&self) -> Vec<SwitchRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl ControllerManager for SimControllerManager {
    async fn load_controller(&self, name: &str) -> Result<bool, BridgeError> {
        if self.behaviour == SimServiceBehaviour::Unresponsive {
            std::future::pending::<()>().await;
        }
        self.loaded.lock().await.push(name.to_string());
        Ok(true)
    }

    async fn wait_for_switch_service(&self) -> Result<(), BridgeError> {
        if matches!(
            self.behaviour,
            SimServiceBehaviour::Unreachable | SimServiceBehaviour::Unresponsive
        ) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn switch_controller(&self, request: &SwitchRequest) -> Result<bool, BridgeError> {
        if self.behaviour == SimServiceBehaviour::Unresponsive {
            std::future::pending::<()>().await;
        }
        if self.behaviour == SimServiceBehaviour::Unreachable {
            return Err(BridgeError::ServiceUnavailable(
                "switch_controller is not advertised".to_string(),
            ));
        }
        self.requests.lock().await.push(request.clone());
        Ok(self.behaviour == SimServiceBehaviour::Accept)
    }
}
