//! [`SimulatorStateWriter`] – the only component that mutates `qpos`.
//!
//! Free-jointed bodies occupy seven contiguous slots (x, y, z, qw, qx, qy,
//! qz) starting at the body's joint address; hinge joints occupy one slot.
//! Hinges go through a per-joint angular offset because the simulated arm's
//! zero pose differs from the physical one on some joints.
//!
//! Out-of-range requests are logged and rejected.  Nothing is ever written
//! outside the addressed joint's slots.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use nalgebra::{Quaternion, Vector3};
use serde::{Deserialize, Serialize};
use simlink_types::{BodyId, BodyPose, BridgeError, JointState, NUM_JOINTS};
use tracing::warn;

use crate::engine::PhysicsEngine;

const FREE_JOINT_SLOTS: usize = 7;
const QUAT_OFFSET: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Added to each sensed joint angle before it is written.
    #[serde(default = "default_hinge_offsets")]
    pub hinge_offsets: [f64; NUM_JOINTS],
}

fn default_hinge_offsets() -> [f64; NUM_JOINTS] {
    [0.0, 0.0, 0.0, 0.0, 0.0, -FRAC_PI_2, -FRAC_PI_4]
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            hinge_offsets: default_hinge_offsets(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorStateWriter {
    hinge_offsets: [f64; NUM_JOINTS],
}

impl SimulatorStateWriter {
    pub fn new(config: &WriterConfig) -> Self {
        Self {
            hinge_offsets: config.hinge_offsets,
        }
    }

    /// Write one positional component (`axis` 0 = x, 1 = y, 2 = z) of a
    /// free-jointed body.
    ///
    /// # Errors
    ///
    /// [`BridgeError::ConfigurationMismatch`] for an axis outside `0..=2` or a
    /// joint whose slots do not fit in `qpos`; [`BridgeError::UnknownBody`]
    /// if the body has no joint.  No write happens in either case.
    pub fn set_free_axis<E: PhysicsEngine + ?Sized>(
        &self,
        engine: &mut E,
        body: BodyId,
        axis: usize,
        value: f64,
    ) -> Result<(), BridgeError> {
        if axis > 2 {
            warn!(body = body.0, axis, "free joint axis out of range; write skipped");
            return Err(BridgeError::ConfigurationMismatch(format!(
                "free joint axis {axis} on body {} (expected 0..=2)",
                body.0
            )));
        }
        let adr = free_joint_address(engine, body)?;
        engine.qpos_mut()[adr + axis] = value;
        Ok(())
    }

    pub fn set_body_position<E: PhysicsEngine + ?Sized>(
        &self,
        engine: &mut E,
        body: BodyId,
        position: &Vector3<f64>,
    ) -> Result<(), BridgeError> {
        for axis in 0..3 {
            self.set_free_axis(engine, body, axis, position[axis])?;
        }
        Ok(())
    }

    /// Write the orientation slots of a free-jointed body, (w, x, y, z) order.
    pub fn set_body_quat<E: PhysicsEngine + ?Sized>(
        &self,
        engine: &mut E,
        body: BodyId,
        q: &Quaternion<f64>,
    ) -> Result<(), BridgeError> {
        let adr = free_joint_address(engine, body)? + QUAT_OFFSET;
        let qpos = engine.qpos_mut();
        qpos[adr] = q.w;
        qpos[adr + 1] = q.i;
        qpos[adr + 2] = q.j;
        qpos[adr + 3] = q.k;
        Ok(())
    }

    pub fn set_body_pose<E: PhysicsEngine + ?Sized>(
        &self,
        engine: &mut E,
        body: BodyId,
        pose: &BodyPose,
    ) -> Result<(), BridgeError> {
        self.set_body_position(engine, body, &pose.position)?;
        self.set_body_quat(engine, body, &pose.orientation)
    }

    /// Write hinge `joint` as `value` plus its configured offset.
    pub fn set_hinge<E: PhysicsEngine + ?Sized>(
        &self,
        engine: &mut E,
        joint: usize,
        value: f64,
    ) -> Result<(), BridgeError> {
        let Some(offset) = self.hinge_offsets.get(joint) else {
            warn!(joint, "hinge index out of range; write skipped");
            return Err(BridgeError::ConfigurationMismatch(format!("hinge joint {joint} has no offset entry")));
        };
        let adr = engine
            .joint_qpos_address(joint)
            .filter(|adr| *adr < engine.qpos().len())
            .ok_or_else(|| BridgeError::ConfigurationMismatch(format!("hinge joint {joint} has no qpos slot")))?;
        engine.qpos_mut()[adr] = value + offset;
        Ok(())
    }

    /// Mirror every sensed joint angle into the simulator.
    pub fn write_joint_state<E: PhysicsEngine + ?Sized>(
        &self,
        engine: &mut E,
        state: &JointState,
    ) -> Result<(), BridgeError> {
        for (joint, value) in state.position.iter().enumerate() {
            self.set_hinge(engine, joint, *value)?;
        }
        Ok(())
    }
}

fn free_joint_address<E: PhysicsEngine + ?Sized>(engine: &E, body: BodyId) -> Result<usize, BridgeError> {
    let adr = engine
        .body_qpos_address(body)
        .ok_or_else(|| BridgeError::UnknownBody(format!("body {} has no joint", body.0)))?;
    if adr + FREE_JOINT_SLOTS > engine.qpos().len() {
        warn!(body = body.0, adr, "free joint slots exceed qpos; write skipped");
        return Err(BridgeError::ConfigurationMismatch(format!(
            "body {} is not a free joint (qpos address {adr})",
            body.0
        )));
    }
    Ok(adr)
}
