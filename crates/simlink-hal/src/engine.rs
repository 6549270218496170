//! Generic `PhysicsEngine` trait for the simulator the optimiser runs on.
//!
//! The bridge only ever talks to this trait.  Integration, forward
//! kinematics, Jacobians and bias forces belong to the engine; the bridge
//! reads them and writes generalized coordinates and controls.
//!
//! Engine calls do not fail.  Model validity (every name resolves, every
//! address is in range) is established once at startup by the caller.

use nalgebra::{DMatrix, UnitQuaternion, Vector3};
use simlink_types::BodyId;

pub trait PhysicsEngine {
    /// Resolve a body by name.
    fn body_id(&self, name: &str) -> Option<BodyId>;

    /// Address in `qpos` of the first coordinate of `body`'s joint.
    fn body_qpos_address(&self, body: BodyId) -> Option<usize>;

    /// Address in `qpos` of hinge joint `joint`.
    fn joint_qpos_address(&self, joint: usize) -> Option<usize>;

    /// Generalized coordinates.
    fn qpos(&self) -> &[f64];
    fn qpos_mut(&mut self) -> &mut [f64];

    /// Actuator inputs. The first [`simlink_types::NUM_JOINTS`] entries drive
    /// the arm; anything after that is a trailing actuator such as a gripper.
    fn ctrl(&self) -> &[f64];
    fn ctrl_mut(&mut self) -> &mut [f64];

    /// Integration step in seconds.
    fn timestep(&self) -> f64;

    /// Recompute kinematics and dynamics quantities from the current state
    /// without advancing time.
    fn forward(&mut self);

    /// Advance the simulation by one timestep using the current `ctrl`.
    fn step(&mut self);

    /// World position of `body` as of the last `forward` / `step`.
    fn body_position(&self, body: BodyId) -> Vector3<f64>;

    /// World orientation of `body` as of the last `forward` / `step`.
    fn body_orientation(&self, body: BodyId) -> UnitQuaternion<f64>;

    /// 6 × nv Jacobian of `body`: translational rows first, then rotational.
    fn jacobian(&self, body: BodyId) -> DMatrix<f64>;

    /// Bias (Coriolis + gravity) generalized forces, length nv.
    fn bias_forces(&self) -> &[f64];
}
