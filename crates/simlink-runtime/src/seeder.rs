//! [`CartesianSeeder`] – resolved-rate seed control sequences.
//!
//! Produces an H-step [`ControlSequence`] that is feasible but deliberately
//! rough: an initial guess for the trajectory optimiser, never a delivered
//! control law.
//!
//! # Per-step law
//!
//! For every step `i` of the waypoint path:
//!
//! 1. error = (waypoint − ee position, axis of start · current⁻¹)
//! 2. wrench = error ⊙ gains
//! 3. correction = J⁺ · wrench (or Jᵀ · wrench), J recomputed at this step
//! 4. command = correction + bias forces at this step
//! 5. clamp the change from the previous command to the jerk limit, then the
//!    magnitude to the torque limit
//! 6. apply the task's held joints and gripper schedule
//! 7. write `ctrl`, then `engine.step()`
//!
//! Generation is causally sequential: each step's error is measured against
//! the state produced by the previous command.  There is no abort path once
//! the loop starts.

use nalgebra::{DMatrix, DVector, UnitQuaternion, Vector3, Vector6};
use serde::{Deserialize, Serialize};
use simlink_hal::{END_EFFECTOR, PhysicsEngine};
use simlink_types::{BodyId, BridgeError, ControlSequence, NUM_JOINTS};
use tracing::{debug, info, instrument, warn};

use crate::path::CartesianWaypointPath;
use crate::task::{SeedTask, TaskGeometry};

/// How the task-space wrench is mapped to joint space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JacobianMapping {
    /// Moore–Penrose pseudoinverse via SVD; singular values below `epsilon`
    /// are treated as zero.  Falls back to the transpose if the
    /// decomposition fails.
    PseudoInverse { epsilon: f64 },
    Transpose,
}

impl Default for JacobianMapping {
    fn default() -> Self {
        JacobianMapping::PseudoInverse { epsilon: 1e-6 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeederConfig {
    /// Number of path points and control steps.
    #[serde(default = "default_horizon")]
    pub horizon: usize,
    /// Translational then rotational error gains.
    #[serde(default = "default_gains")]
    pub gains: [f64; 6],
    /// Largest per-joint change between consecutive commands.
    #[serde(default = "default_jerk_limit")]
    pub jerk_limit: f64,
    #[serde(default = "default_torque_limits")]
    pub torque_limits: [f64; NUM_JOINTS],
    #[serde(default)]
    pub mapping: JacobianMapping,
    #[serde(default = "default_end_effector")]
    pub end_effector: String,
    /// Trailing actuator value for an open gripper.
    #[serde(default = "default_gripper_open")]
    pub gripper_open_ctrl: f64,
    #[serde(default)]
    pub gripper_closed_ctrl: f64,
}

fn default_horizon() -> usize {
    5000
}

fn default_gains() -> [f64; 6] {
    [10000.0, 10000.0, 10000.0, 500.0, 500.0, 500.0]
}

fn default_jerk_limit() -> f64 {
    1.0
}

fn default_torque_limits() -> [f64; NUM_JOINTS] {
    [87.0, 87.0, 87.0, 87.0, 12.0, 12.0, 12.0]
}

fn default_end_effector() -> String {
    END_EFFECTOR.to_string()
}

fn default_gripper_open() -> f64 {
    0.04
}

impl Default for SeederConfig {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            gains: default_gains(),
            jerk_limit: default_jerk_limit(),
            torque_limits: default_torque_limits(),
            mapping: JacobianMapping::default(),
            end_effector: default_end_effector(),
            gripper_open_ctrl: default_gripper_open(),
            gripper_closed_ctrl: 0.0,
        }
    }
}

impl SeederConfig {
    /// # Errors
    ///
    /// [`BridgeError::Config`] for a horizon under two steps or a negative
    /// limit.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.horizon < 2 {
            return Err(BridgeError::Config(format!("horizon must be at least 2, got {}", self.horizon)));
        }
        if self.jerk_limit < 0.0 || self.torque_limits.iter().any(|l| *l < 0.0) {
            return Err(BridgeError::Config("jerk and torque limits must be non-negative".to_string()));
        }
        Ok(())
    }
}

/// Path and commands from one [`CartesianSeeder::build`].
#[derive(Debug, Clone, PartialEq)]
pub struct SeedResult {
    pub path: CartesianWaypointPath,
    pub controls: ControlSequence,
}

pub struct CartesianSeeder {
    config: SeederConfig,
}

impl CartesianSeeder {
    pub fn new(config: SeederConfig) -> Result<Self, BridgeError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SeederConfig {
        &self.config
    }

    /// Build the path for `task` from `geometry`.
    pub fn plan(&self, task: &dyn SeedTask, geometry: &TaskGeometry) -> Result<CartesianWaypointPath, BridgeError> {
        if self.config.horizon < task.min_horizon() {
            return Err(BridgeError::ConfigurationMismatch(format!(
                "task '{}' needs a horizon of at least {}, got {}",
                task.name(),
                task.min_horizon(),
                self.config.horizon
            )));
        }
        CartesianWaypointPath::piecewise(
            geometry.start,
            &task.via_points(geometry),
            &task.segments(self.config.horizon),
        )
    }

    /// Run the seeding loop on `engine`, advancing it `horizon` steps.
    ///
    /// # Errors
    ///
    /// Only before the loop starts: [`BridgeError::UnknownBody`] for a
    /// missing end effector, [`BridgeError::ConfigurationMismatch`] for a
    /// bad path or an engine with too few degrees of freedom.
    #[instrument(skip_all, fields(task = task.name()))]
    pub fn build<E: PhysicsEngine + ?Sized>(
        &self,
        engine: &mut E,
        task: &dyn SeedTask,
        geometry: &TaskGeometry,
    ) -> Result<SeedResult, BridgeError> {
        let ee = engine
            .body_id(&self.config.end_effector)
            .ok_or_else(|| BridgeError::UnknownBody(self.config.end_effector.clone()))?;
        let (rows, dofs) = engine.jacobian(ee).shape();
        if engine.ctrl().len() < NUM_JOINTS || dofs < NUM_JOINTS || rows != 6 {
            return Err(BridgeError::ConfigurationMismatch(format!(
                "engine has {} actuators and a {rows} x {dofs} jacobian; the arm needs {NUM_JOINTS} of each",
                engine.ctrl().len(),
            )));
        }
        let path = self.plan(task, geometry)?;
        if path.len() != self.config.horizon {
            return Err(BridgeError::ConfigurationMismatch(format!(
                "task '{}' produced {} path points for a horizon of {}",
                task.name(),
                path.len(),
                self.config.horizon
            )));
        }

        info!(task = task.name(), horizon = path.len(), target = ?path.last(), "seeding started");
        engine.forward();

        let gains = Vector6::from_column_slice(&self.config.gains);
        let mut controls = ControlSequence::with_capacity(path.len());
        let mut last = [0.0; NUM_JOINTS];
        let mut fallbacks = 0usize;

        for (step, waypoint) in path.points().iter().enumerate() {
            let error = self.pose_error(engine, ee, waypoint, geometry);
            let wrench = error.component_mul(&gains);

            let correction = self.map_wrench(engine.jacobian(ee), &wrench, &mut fallbacks);

            let bias = engine.bias_forces();
            let mut command = [0.0; NUM_JOINTS];
            for joint in 0..NUM_JOINTS {
                let held = task.held_joints().contains(&joint);
                let mapped = if held { 0.0 } else { correction.get(joint).copied().unwrap_or(0.0) };
                let jerk = self.config.jerk_limit;
                let limit = self.config.torque_limits[joint];
                let wanted = mapped + bias.get(joint).copied().unwrap_or(0.0);
                command[joint] = wanted
                    .clamp(last[joint] - jerk, last[joint] + jerk)
                    .clamp(-limit, limit);
            }

            let open = task.gripper_open(step);
            let ctrl = engine.ctrl_mut();
            ctrl[..NUM_JOINTS].copy_from_slice(&command);
            if let Some(open) = open {
                let value = if open { self.config.gripper_open_ctrl } else { self.config.gripper_closed_ctrl };
                ctrl[NUM_JOINTS..].fill(value);
            }

            controls.push(command, open.unwrap_or(false));
            last = command;
            engine.step();
        }

        if fallbacks > 0 {
            warn!(task = task.name(), fallbacks, "pseudoinverse failed on some steps; transpose mapping used");
        }
        info!(
            task = task.name(),
            steps = controls.len(),
            final_ee = ?engine.body_position(ee),
            "seeding finished"
        );
        Ok(SeedResult { path, controls })
    }

    fn pose_error<E: PhysicsEngine + ?Sized>(
        &self,
        engine: &E,
        ee: BodyId,
        waypoint: &Vector3<f64>,
        geometry: &TaskGeometry,
    ) -> Vector6<f64> {
        let translation = waypoint - engine.body_position(ee);
        let rotation = orientation_error(&geometry.start_orientation, &engine.body_orientation(ee));
        Vector6::new(
            translation.x,
            translation.y,
            translation.z,
            rotation.x,
            rotation.y,
            rotation.z,
        )
    }

    /// Joint-space correction for `wrench`.  Counts pseudoinverse failures
    /// in `fallbacks`.
    fn map_wrench(&self, jacobian: DMatrix<f64>, wrench: &Vector6<f64>, fallbacks: &mut usize) -> DVector<f64> {
        let wrench = DVector::from_column_slice(wrench.as_slice());
        match self.config.mapping {
            JacobianMapping::Transpose => jacobian.transpose() * wrench,
            JacobianMapping::PseudoInverse { epsilon } => {
                let transpose = jacobian.transpose();
                match jacobian.pseudo_inverse(epsilon) {
                    Ok(pinv) => pinv * wrench,
                    Err(reason) => {
                        debug!(reason, "pseudoinverse failed; using transpose");
                        *fallbacks += 1;
                        transpose * wrench
                    }
                }
            }
        }
    }
}

/// Rotational error of `current` against `start`: the unit axis of
/// `start · current⁻¹`, or zero when the two coincide.
fn orientation_error(start: &UnitQuaternion<f64>, current: &UnitQuaternion<f64>) -> Vector3<f64> {
    (start * current.inverse())
        .axis()
        .map(|axis| axis.into_inner())
        .unwrap_or_else(Vector3::zeros)
}

/// Torque to send to the physical arm for a simulated control: the
/// simulator's command minus the bias the robot's own controller already
/// compensates.
pub fn torques_for_robot(control: &[f64; NUM_JOINTS], bias: &[f64]) -> [f64; NUM_JOINTS] {
    let mut out = *control;
    for (value, b) in out.iter_mut().zip(bias) {
        *value -= b;
    }
    out
}
