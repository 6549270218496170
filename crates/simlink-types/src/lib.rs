//! `simlink-types` – shared data model for the simulator ↔ robot bridge.
//!
//! Every other crate in the workspace speaks in these types: sensed
//! [`JointState`], externally tracked [`BodyPose`]s, the seed
//! [`ControlSequence`] handed to the optimiser, the inbound
//! [`SensorMessage`] envelope, and the workspace-wide [`BridgeError`].

use chrono::{DateTime, Utc};
use nalgebra::{Isometry3, Quaternion, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of actuated arm joints.
pub const NUM_JOINTS: usize = 7;

/// Ordered per-joint positions and velocities, refreshed at sensor rate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointState {
    pub position: [f64; NUM_JOINTS],
    pub velocity: [f64; NUM_JOINTS],
}

/// A rigid-body pose: position plus unit quaternion stored as (w, x, y, z).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyPose {
    pub position: Vector3<f64>,
    pub orientation: Quaternion<f64>,
}

impl BodyPose {
    pub fn new(position: Vector3<f64>, orientation: Quaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Origin with the identity rotation.
    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), Quaternion::identity())
    }

    /// Convert a transform-tree isometry into a pose.
    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        Self::new(iso.translation.vector, *iso.rotation.quaternion())
    }
}

impl Default for BodyPose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Handle to a body inside the physics engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodyId(pub usize);

/// An externally tracked object mirrored into the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    /// Stream / simulator body name, e.g. `"cheezit"`.
    pub name: String,
    /// Parent frame used for transform-tree lookups.
    pub parent_frame: String,
    /// Target frame used for transform-tree lookups.
    pub target_frame: String,
    pub body: BodyId,
    /// Last received pose, in the external tracking frame.
    pub pose: BodyPose,
    /// Whether any sample has arrived since startup.
    pub received: bool,
}

/// Seed controls for the optimiser: one command per step plus a parallel
/// gripper flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlSequence {
    pub commands: Vec<[f64; NUM_JOINTS]>,
    pub gripper_open: Vec<bool>,
}

impl ControlSequence {
    pub fn with_capacity(steps: usize) -> Self {
        Self {
            commands: Vec::with_capacity(steps),
            gripper_open: Vec::with_capacity(steps),
        }
    }

    pub fn push(&mut self, command: [f64; NUM_JOINTS], gripper_open: bool) {
        self.commands.push(command);
        self.gripper_open.push(gripper_open);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[f64; NUM_JOINTS], bool)> {
        self.commands.iter().zip(self.gripper_open.iter().copied())
    }
}

/// Semantics of an outbound command vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuationMode {
    Torque,
    Position,
}

/// Where tracked-object poses come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseSource {
    /// Motion-capture streams, re-expressed through the frame transformer.
    #[default]
    GroundTruth,
    /// Parent → target lookups in the transform tree.
    TransformTree,
}

/// Result of a controller-switch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwitchOutcome {
    Ok,
    /// The switch service did not answer within the bounded wait.
    Unreachable,
    /// The service answered and refused the switch.
    Rejected,
}

/// Inbound sample envelope delivered by the messaging layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorMessage {
    pub topic: String,
    pub stamp: DateTime<Utc>,
    pub payload: SensorPayload,
}

impl SensorMessage {
    /// Wrap `payload` for `topic`, stamped now.
    pub fn new(topic: impl Into<String>, payload: SensorPayload) -> Self {
        Self {
            topic: topic.into(),
            stamp: Utc::now(),
            payload,
        }
    }
}

/// Variants of data carried by inbound sensor topics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SensorPayload {
    JointPositions(Vec<f64>),
    JointVelocities(Vec<f64>),
    Pose(BodyPose),
    /// One edge of the transform tree.
    Transform {
        parent: String,
        child: String,
        pose: BodyPose,
    },
}

/// Workspace-wide error type.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BridgeError {
    #[error("Transform lookup failed from {parent} to {target}")]
    LookupFailure { parent: String, target: String },

    #[error("Safety limit exceeded on joint {joint}: |{velocity}| > {limit}")]
    SafetyLimitExceeded {
        joint: usize,
        velocity: f64,
        limit: f64,
    },

    #[error("Configuration mismatch: {0}")]
    ConfigurationMismatch(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Unknown simulator body: {0}")]
    UnknownBody(String),

    #[error("Command publish failed: {0}")]
    Publish(String),

    #[error("Config error: {0}")]
    Config(String),
}
