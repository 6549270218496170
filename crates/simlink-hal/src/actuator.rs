//! Generic `CommandSink` trait for the physical arm's command topic.
//!
//! Drivers implement this trait to carry a [`JointCommand`] to the robot.
//! The safety gate is the only caller; it decides whether and what to
//! publish, the sink just delivers.

use serde::{Deserialize, Serialize};
use simlink_types::{ActuationMode, BridgeError, NUM_JOINTS};
use tracing::info;

/// One outbound command vector with its semantics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointCommand {
    pub mode: ActuationMode,
    pub values: [f64; NUM_JOINTS],
}

impl JointCommand {
    pub fn zeros(mode: ActuationMode) -> Self {
        Self {
            mode,
            values: [0.0; NUM_JOINTS],
        }
    }
}

/// Outbound command channel to the low-level controller.
pub trait CommandSink: Send {
    /// Deliver `command`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Publish`] if the transport refuses the message.
    fn publish(&mut self, command: &JointCommand) -> Result<(), BridgeError>;
}

/// Sink that only logs, for dry runs with no robot attached.
#[derive(Debug, Default)]
pub struct TracingSink {
    published: usize,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> usize {
        self.published
    }
}

impl CommandSink for TracingSink {
    fn publish(&mut self, command: &JointCommand) -> Result<(), BridgeError> {
        self.published += 1;
        info!(mode = ?command.mode, values = ?command.values, "command sent");
        Ok(())
    }
}
