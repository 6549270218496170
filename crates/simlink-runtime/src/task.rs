//! Seeding tasks – one [`SeedTask`] per manipulation task.
//!
//! A task decides *where* the end effector should go (its targets and how
//! the horizon is split between them) and which actuators it overrides.  The
//! [`CartesianSeeder`][crate::seeder::CartesianSeeder] decides *how* to get
//! there and is shared by every task.
//!
//! | Task | Targets | Overrides |
//! |---|---|---|
//! | [`ReachTask`] | goal + offset | – |
//! | [`PushTask`] | behind the object, then the goal edge | – |
//! | [`ClutterReachTask`] | goal + (0.1, 0.3) | wrist held, gripper schedule |

use std::f64::consts::FRAC_PI_4;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use simlink_hal::PhysicsEngine;
use simlink_types::{BridgeError, NUM_JOINTS};

/// Positions a task plans against, captured once before seeding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskGeometry {
    /// End-effector position at build time.
    pub start: Vector3<f64>,
    /// End-effector orientation at build time; held for the whole path.
    pub start_orientation: UnitQuaternion<f64>,
    /// Where the task should finish (the goal marker).
    pub goal: Vector3<f64>,
    /// The manipulated object.
    pub object: Vector3<f64>,
}

impl TaskGeometry {
    /// Read the geometry from the engine's current state.
    ///
    /// Runs `forward` first so the poses reflect the latest coordinates.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownBody`] if any of the three bodies is missing.
    pub fn from_engine<E: PhysicsEngine + ?Sized>(
        engine: &mut E,
        end_effector: &str,
        goal: &str,
        object: &str,
    ) -> Result<Self, BridgeError> {
        let resolve = |name: &str| {
            engine
                .body_id(name)
                .ok_or_else(|| BridgeError::UnknownBody(name.to_string()))
        };
        let (ee, goal, object) = (resolve(end_effector)?, resolve(goal)?, resolve(object)?);
        engine.forward();
        Ok(Self {
            start: engine.body_position(ee),
            start_orientation: engine.body_orientation(ee),
            goal: engine.body_position(goal),
            object: engine.body_position(object),
        })
    }
}

/// One manipulation task's path shape and actuator overrides.
pub trait SeedTask: Send + Sync {
    fn name(&self) -> &str;

    /// Points the path visits after its start, in order.
    fn via_points(&self, geometry: &TaskGeometry) -> Vec<Vector3<f64>>;

    /// Sub-steps per segment for a path of `horizon` points.  One entry per
    /// via point, summing to `horizon - 1`.
    fn segments(&self, horizon: usize) -> Vec<usize> {
        vec![horizon.saturating_sub(1)]
    }

    /// Fewest path points that give every segment at least one step.
    fn min_horizon(&self) -> usize {
        2
    }

    /// Gripper state at `step`, or `None` to leave the gripper actuators
    /// alone.
    fn gripper_open(&self, _step: usize) -> Option<bool> {
        None
    }

    /// Joints whose Jacobian correction is forced to zero.
    fn held_joints(&self) -> &[usize] {
        &[]
    }
}

/// Built-in tasks, selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Reach,
    Push,
    ClutterReach,
}

impl TaskKind {
    pub fn build(self) -> Box<dyn SeedTask> {
        match self {
            TaskKind::Reach => Box::new(ReachTask::default()),
            TaskKind::Push => Box::new(PushTask::default()),
            TaskKind::ClutterReach => Box::new(ClutterReachTask::default()),
        }
    }
}

impl std::str::FromStr for TaskKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reach" => Ok(TaskKind::Reach),
            "push" => Ok(TaskKind::Push),
            "clutter_reach" => Ok(TaskKind::ClutterReach),
            other => Err(BridgeError::Config(format!("unknown task '{other}'"))),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Reach
// ────────────────────────────────────────────────────────────────────────────

/// Straight line from the start to the goal plus a fixed offset.
#[derive(Debug, Clone, Default)]
pub struct ReachTask {
    pub offset: Vector3<f64>,
}

impl SeedTask for ReachTask {
    fn name(&self) -> &str {
        "reach"
    }

    fn via_points(&self, geometry: &TaskGeometry) -> Vec<Vector3<f64>> {
        vec![geometry.goal + self.offset]
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Push
// ────────────────────────────────────────────────────────────────────────────

/// Approach the object from behind, then push it to the goal.
///
/// The end point sits on the near edge of the goal, one `object_radius`
/// away at 45°.  The via point lies `standoff` behind the object along the
/// object → end-point direction, rotated by `angle_margin` away from the
/// object.  The first `split` sub-steps go to the via point, the rest to the
/// end point.
#[derive(Debug, Clone)]
pub struct PushTask {
    pub object_radius: f64,
    pub angle_margin: f64,
    pub standoff: f64,
    pub split: usize,
}

impl Default for PushTask {
    fn default() -> Self {
        Self {
            object_radius: 0.04,
            angle_margin: 0.4,
            standoff: 0.15,
            split: 1000,
        }
    }
}

impl PushTask {
    /// Where the end effector finishes.
    pub fn end_point(&self, geometry: &TaskGeometry) -> Vector3<f64> {
        let dx = self.object_radius * FRAC_PI_4.sin();
        let dy = self.object_radius * FRAC_PI_4.cos();
        let y = if geometry.goal.y - geometry.start.y > 0.0 {
            geometry.goal.y - dy
        } else {
            geometry.goal.y + dy
        };
        Vector3::new(geometry.goal.x - dx, y, geometry.start.z)
    }

    /// Point behind the object the end effector lines up on.
    pub fn approach_point(&self, geometry: &TaskGeometry) -> Vector3<f64> {
        let end = self.end_point(geometry);
        let mut angle = (end.y - geometry.object.y).atan2(end.x - geometry.object.x);
        if end.y > geometry.object.y {
            angle += self.angle_margin;
        } else {
            angle -= self.angle_margin;
        }
        Vector3::new(
            geometry.object.x - self.standoff * angle.cos(),
            geometry.object.y - self.standoff * angle.sin(),
            geometry.start.z,
        )
    }
}

impl SeedTask for PushTask {
    fn name(&self) -> &str {
        "push"
    }

    fn via_points(&self, geometry: &TaskGeometry) -> Vec<Vector3<f64>> {
        vec![self.approach_point(geometry), self.end_point(geometry)]
    }

    fn segments(&self, horizon: usize) -> Vec<usize> {
        let total = horizon.saturating_sub(1);
        let first = self.split.min(total.saturating_sub(1)).max(1);
        vec![first, total.saturating_sub(first)]
    }

    fn min_horizon(&self) -> usize {
        3
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Clutter reach
// ────────────────────────────────────────────────────────────────────────────

/// Reach past the goal into clutter, wrist fixed, gripper opening midway.
#[derive(Debug, Clone)]
pub struct ClutterReachTask {
    pub offset: Vector3<f64>,
    pub held_joints: Vec<usize>,
    /// Gripper is open for steps strictly inside this window.
    pub open_after: usize,
    pub close_at: usize,
}

impl Default for ClutterReachTask {
    fn default() -> Self {
        Self {
            offset: Vector3::new(0.1, 0.3, 0.0),
            held_joints: vec![NUM_JOINTS - 1],
            open_after: 1000,
            close_at: 2500,
        }
    }
}

impl SeedTask for ClutterReachTask {
    fn name(&self) -> &str {
        "clutter_reach"
    }

    fn via_points(&self, geometry: &TaskGeometry) -> Vec<Vector3<f64>> {
        let mut target = geometry.goal + self.offset;
        target.z = geometry.start.z;
        vec![target]
    }

    fn gripper_open(&self, step: usize) -> Option<bool> {
        Some(step > self.open_after && step < self.close_at)
    }

    fn held_joints(&self) -> &[usize] {
        &self.held_joints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use simlink_hal::{END_EFFECTOR, SimEngine, SimulatorStateWriter, WriterConfig};

    fn geometry() -> TaskGeometry {
        TaskGeometry {
            start: Vector3::new(0.0, 0.0, 0.5),
            start_orientation: UnitQuaternion::identity(),
            goal: Vector3::new(0.6, 0.2, 0.5),
            object: Vector3::new(0.4, 0.0, 0.5),
        }
    }

    #[test]
    fn reach_goes_straight_to_goal() {
        let task = ReachTask::default();
        assert_eq!(task.via_points(&geometry()), vec![geometry().goal]);
        assert_eq!(task.segments(5000), vec![4999]);
        assert_eq!(task.gripper_open(10), None);
    }

    #[test]
    fn push_end_point_sits_on_goal_edge() {
        let task = PushTask::default();
        let end = task.end_point(&geometry());
        let d = 0.04 * FRAC_PI_4.sin();
        assert_relative_eq!(end.x, 0.6 - d, epsilon = 1e-12);
        // Goal is to the +y side of the start: approach from below.
        assert_relative_eq!(end.y, 0.2 - d, epsilon = 1e-12);

        let mut g = geometry();
        g.goal.y = -0.2;
        assert_relative_eq!(task.end_point(&g).y, -0.2 + d, epsilon = 1e-12);
    }

    #[test]
    fn push_approach_is_behind_object_with_margin() {
        let task = PushTask::default();
        let g = geometry();
        let end = task.end_point(&g);
        let via = task.approach_point(&g);
        assert_relative_eq!((via - g.object).xy().norm(), 0.15, epsilon = 1e-12);

        let push_dir = (end - g.object).xy().normalize();
        let back_dir = (g.object - via).xy().normalize();
        let between = push_dir.dot(&back_dir).clamp(-1.0, 1.0).acos();
        assert_relative_eq!(between, 0.4, epsilon = 1e-9);
    }

    #[test]
    fn push_splits_horizon_at_the_approach_point() {
        let task = PushTask::default();
        assert_eq!(task.segments(5000), vec![1000, 3999]);
        // Short horizons still leave both segments non-empty.
        assert_eq!(task.segments(10), vec![8, 1]);
        assert_eq!(task.segments(task.min_horizon()), vec![1, 1]);
        assert_eq!(ReachTask::default().min_horizon(), 2);
    }

    #[test]
    fn clutter_reach_holds_wrist_and_schedules_gripper() {
        let task = ClutterReachTask::default();
        let target = task.via_points(&geometry())[0];
        assert_relative_eq!(target.x, 0.7, epsilon = 1e-12);
        assert_relative_eq!(target.y, 0.5, epsilon = 1e-12);
        assert_eq!(task.held_joints(), &[6]);
        assert_eq!(task.gripper_open(1000), Some(false));
        assert_eq!(task.gripper_open(1001), Some(true));
        assert_eq!(task.gripper_open(2499), Some(true));
        assert_eq!(task.gripper_open(2500), Some(false));
    }

    #[test]
    fn geometry_is_read_from_engine() {
        let mut engine = SimEngine::builder().free_body("goal").free_body("cheezit").build();
        let writer = SimulatorStateWriter::new(&WriterConfig::default());
        let goal = engine.body_id("goal").unwrap();
        writer
            .set_body_position(&mut engine, goal, &Vector3::new(0.3, 0.1, 0.5))
            .unwrap();
        let g = TaskGeometry::from_engine(&mut engine, END_EFFECTOR, "goal", "cheezit").unwrap();
        assert_eq!(g.goal, Vector3::new(0.3, 0.1, 0.5));
        assert_eq!(g.start, Vector3::new(0.0, 0.0, 0.5));

        let missing = TaskGeometry::from_engine(&mut engine, END_EFFECTOR, "goal", "mug");
        assert!(matches!(missing, Err(BridgeError::UnknownBody(_))));
    }

    #[test]
    fn task_kind_parses_config_names() {
        assert_eq!("clutter_reach".parse::<TaskKind>().unwrap(), TaskKind::ClutterReach);
        assert!("dance".parse::<TaskKind>().is_err());
        assert_eq!(TaskKind::Push.build().name(), "push");
    }
}
