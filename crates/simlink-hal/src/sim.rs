//! In-process stand-ins for headless runs and tests.
//!
//! [`SimEngine`] is a small deterministic [`PhysicsEngine`]: a seven-hinge
//! arm whose end-effector position is a fixed linear function of the joint
//! angles (its orientation a fixed rotation vector function of them, zero by
//! default), constant bias torques, a first-order actuator response, plus any
//! number of free-jointed bodies for tracked objects and trailing gripper
//! actuators.  It is not a physics simulator; it exercises every engine call
//! the bridge makes with predictable numbers.
//!
//! [`RecordingSink`] is a [`CommandSink`] that keeps everything it is given.
//!
//! # Example
//!
//! ```rust
//! use simlink_hal::engine::PhysicsEngine;
//! use simlink_hal::sim::{SimEngine, END_EFFECTOR};
//!
//! let mut engine = SimEngine::builder().free_body("cheezit").grippers(2).build();
//! let ee = engine.body_id(END_EFFECTOR).unwrap();
//! engine.forward();
//! assert!((engine.body_position(ee).z - 0.5).abs() < 1e-12);
//! ```

use nalgebra::{DMatrix, Quaternion, SMatrix, UnitQuaternion, Vector3};
use simlink_types::{BodyId, BridgeError, NUM_JOINTS};

use crate::actuator::{CommandSink, JointCommand};
use crate::engine::PhysicsEngine;

/// Name of the arm's end-effector body.
pub const END_EFFECTOR: &str = "end_effector";

const FREE_QPOS: usize = 7;
const FREE_QVEL: usize = 6;

type ArmJacobian = SMatrix<f64, 3, NUM_JOINTS>;

// ────────────────────────────────────────────────────────────────────────────
// SimEngine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SimEngine {
    names: Vec<String>,
    body_qpos: Vec<Option<usize>>,
    qpos: Vec<f64>,
    qvel: Vec<f64>,
    ctrl: Vec<f64>,
    bias: Vec<f64>,
    timestep: f64,
    response_gain: f64,
    ee_origin: Vector3<f64>,
    ee_jacobian: ArmJacobian,
    ee_angular: ArmJacobian,
    ee_orientation: UnitQuaternion<f64>,
    xpos: Vec<Vector3<f64>>,
    xquat: Vec<UnitQuaternion<f64>>,
    steps: usize,
    forward_calls: usize,
}

impl SimEngine {
    pub fn builder() -> SimEngineBuilder {
        SimEngineBuilder::default()
    }

    pub fn qvel(&self) -> &[f64] {
        &self.qvel
    }

    /// Number of `step` calls so far.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Number of `forward` calls so far.
    pub fn forward_calls(&self) -> usize {
        self.forward_calls
    }

    fn arm_angles(&self) -> SMatrix<f64, NUM_JOINTS, 1> {
        SMatrix::<f64, NUM_JOINTS, 1>::from_column_slice(&self.qpos[..NUM_JOINTS])
    }

    fn update_kinematics(&mut self) {
        let q = self.arm_angles();
        self.xpos[0] = self.ee_origin + self.ee_jacobian * q;
        self.xquat[0] = UnitQuaternion::from_scaled_axis(self.ee_angular * q) * self.ee_orientation;
        for body in 1..self.names.len() {
            let Some(adr) = self.body_qpos[body] else {
                continue;
            };
            let q = &self.qpos[adr..adr + FREE_QPOS];
            self.xpos[body] = Vector3::new(q[0], q[1], q[2]);
            self.xquat[body] = UnitQuaternion::try_new(Quaternion::new(q[3], q[4], q[5], q[6]), 1e-12)
                .unwrap_or_else(UnitQuaternion::identity);
        }
    }
}

impl PhysicsEngine for SimEngine {
    fn body_id(&self, name: &str) -> Option<BodyId> {
        self.names.iter().position(|n| n == name).map(BodyId)
    }

    fn body_qpos_address(&self, body: BodyId) -> Option<usize> {
        self.body_qpos.get(body.0).copied().flatten()
    }

    fn joint_qpos_address(&self, joint: usize) -> Option<usize> {
        (joint < NUM_JOINTS).then_some(joint)
    }

    fn qpos(&self) -> &[f64] {
        &self.qpos
    }

    fn qpos_mut(&mut self) -> &mut [f64] {
        &mut self.qpos
    }

    fn ctrl(&self) -> &[f64] {
        &self.ctrl
    }

    fn ctrl_mut(&mut self) -> &mut [f64] {
        &mut self.ctrl
    }

    fn timestep(&self) -> f64 {
        self.timestep
    }

    fn forward(&mut self) {
        self.forward_calls += 1;
        self.update_kinematics();
    }

    fn step(&mut self) {
        for joint in 0..NUM_JOINTS {
            self.qvel[joint] = self.response_gain * (self.ctrl[joint] - self.bias[joint]);
            self.qpos[joint] += self.timestep * self.qvel[joint];
        }
        self.steps += 1;
        self.update_kinematics();
    }

    fn body_position(&self, body: BodyId) -> Vector3<f64> {
        self.xpos.get(body.0).copied().unwrap_or_else(Vector3::zeros)
    }

    fn body_orientation(&self, body: BodyId) -> UnitQuaternion<f64> {
        self.xquat.get(body.0).copied().unwrap_or_else(UnitQuaternion::identity)
    }

    fn jacobian(&self, body: BodyId) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(6, self.qvel.len());
        if body.0 == 0 {
            for r in 0..3 {
                for c in 0..NUM_JOINTS {
                    jac[(r, c)] = self.ee_jacobian[(r, c)];
                    jac[(r + 3, c)] = self.ee_angular[(r, c)];
                }
            }
        }
        jac
    }

    fn bias_forces(&self) -> &[f64] {
        &self.bias
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for [`SimEngine`].  Call the `with`-style methods for the parts
/// you need, then [`build`][Self::build].
#[derive(Debug, Clone)]
pub struct SimEngineBuilder {
    timestep: f64,
    response_gain: f64,
    ee_origin: Vector3<f64>,
    ee_jacobian: ArmJacobian,
    ee_angular: ArmJacobian,
    ee_orientation: UnitQuaternion<f64>,
    arm_bias: [f64; NUM_JOINTS],
    free_bodies: Vec<String>,
    grippers: usize,
}

impl Default for SimEngineBuilder {
    fn default() -> Self {
        Self {
            timestep: 0.004,
            response_gain: 0.01,
            ee_origin: Vector3::new(0.0, 0.0, 0.5),
            ee_jacobian: ArmJacobian::from_row_slice(&[
                0.5, 0.0, 0.3, 0.0, 0.2, 0.0, 0.1, //
                0.0, 0.5, 0.0, 0.3, 0.0, 0.2, 0.0, //
                0.1, 0.0, 0.2, 0.0, 0.4, 0.0, 0.3,
            ]),
            ee_angular: ArmJacobian::zeros(),
            ee_orientation: UnitQuaternion::identity(),
            arm_bias: [0.0, -3.5, 0.0, 2.1, 0.0, 0.4, 0.0],
            free_bodies: Vec::new(),
            grippers: 0,
        }
    }
}

impl SimEngineBuilder {
    pub fn timestep(mut self, dt: f64) -> Self {
        self.timestep = dt;
        self
    }

    /// Joint velocity per unit of net torque.
    pub fn response_gain(mut self, gain: f64) -> Self {
        self.response_gain = gain;
        self
    }

    /// End-effector position at zero joint angles.
    pub fn end_effector_origin(mut self, origin: Vector3<f64>) -> Self {
        self.ee_origin = origin;
        self
    }

    pub fn arm_jacobian(mut self, jacobian: SMatrix<f64, 3, NUM_JOINTS>) -> Self {
        self.ee_jacobian = jacobian;
        self
    }

    /// Rotational rows of the end-effector Jacobian.  The end-effector
    /// orientation becomes `exp(angular · q) · orientation`.
    pub fn arm_angular_jacobian(mut self, angular: SMatrix<f64, 3, NUM_JOINTS>) -> Self {
        self.ee_angular = angular;
        self
    }

    /// End-effector orientation at zero joint angles.
    pub fn end_effector_orientation(mut self, orientation: UnitQuaternion<f64>) -> Self {
        self.ee_orientation = orientation;
        self
    }

    pub fn arm_bias(mut self, bias: [f64; NUM_JOINTS]) -> Self {
        self.arm_bias = bias;
        self
    }

    /// Add a free-jointed body, e.g. a tracked object or the goal marker.
    pub fn free_body(mut self, name: impl Into<String>) -> Self {
        self.free_bodies.push(name.into());
        self
    }

    /// Number of trailing actuators after the arm joints.
    pub fn grippers(mut self, count: usize) -> Self {
        self.grippers = count;
        self
    }

    pub fn build(self) -> SimEngine {
        let mut names = vec![END_EFFECTOR.to_string()];
        let mut body_qpos = vec![None];
        let mut qpos = vec![0.0; NUM_JOINTS];
        for name in self.free_bodies {
            body_qpos.push(Some(qpos.len()));
            names.push(name);
            qpos.extend_from_slice(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
        }
        let nv = NUM_JOINTS + (names.len() - 1) * FREE_QVEL;
        let mut bias = vec![0.0; nv];
        bias[..NUM_JOINTS].copy_from_slice(&self.arm_bias);

        let mut engine = SimEngine {
            xpos: vec![Vector3::zeros(); names.len()],
            xquat: vec![UnitQuaternion::identity(); names.len()],
            names,
            body_qpos,
            qpos,
            qvel: vec![0.0; nv],
            ctrl: vec![0.0; NUM_JOINTS + self.grippers],
            bias,
            timestep: self.timestep,
            response_gain: self.response_gain,
            ee_origin: self.ee_origin,
            ee_jacobian: self.ee_jacobian,
            ee_angular: self.ee_angular,
            ee_orientation: self.ee_orientation,
            steps: 0,
            forward_calls: 0,
        };
        engine.update_kinematics();
        engine
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RecordingSink
// ────────────────────────────────────────────────────────────────────────────

/// A [`CommandSink`] that records every published command.
#[derive(Debug, Default)]
pub struct RecordingSink {
    published: Vec<JointCommand>,
    refuse: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose transport refuses every message.
    pub fn refusing() -> Self {
        Self {
            published: Vec::new(),
            refuse: true,
        }
    }

    pub fn published(&self) -> &[JointCommand] {
        &self.published
    }
}

impl CommandSink for RecordingSink {
    fn publish(&mut self, command: &JointCommand) -> Result<(), BridgeError> {
        if self.refuse {
            return Err(BridgeError::Publish("transport refused command".to_string()));
        }
        self.published.push(*command);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
