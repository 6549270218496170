//! `simlink-runtime` – Orchestration and seeding
//!
//! Where the bridge's pieces meet: the per-cycle sensor → simulator refresh,
//! controller switching, gated dispatch, and the seed trajectories handed to
//! the optimiser.
//!
//! # Modules
//!
//! - [`bridge`] – [`RobotBridge`][bridge::RobotBridge]: the context object
//!   owning engine, hub, writer, transformer, safety gate and stale-stream monitor; runs
//!   one refresh per [`cycle`][bridge::RobotBridge::cycle].
//! - [`seeder`] – [`CartesianSeeder`][seeder::CartesianSeeder]: resolved-rate
//!   Jacobian feedback that turns a waypoint path into a seed
//!   [`ControlSequence`][simlink_types::ControlSequence], stepping the engine
//!   once per command.
//! - [`task`] – [`SeedTask`][task::SeedTask] strategies: reach, push and
//!   clutter-reach.
//! - [`path`] – [`CartesianWaypointPath`][path::CartesianWaypointPath]:
//!   piecewise-linear end-effector targets.

pub mod bridge;
pub mod path;
pub mod seeder;
pub mod task;

pub use bridge::{BridgeConfig, CycleReport, ObjectConfig, RobotBridge};
pub use path::CartesianWaypointPath;
pub use seeder::{CartesianSeeder, JacobianMapping, SeedResult, SeederConfig, torques_for_robot};
pub use task::{ClutterReachTask, PushTask, ReachTask, SeedTask, TaskGeometry, TaskKind};
