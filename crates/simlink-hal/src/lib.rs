//! `simlink-hal` – the bridge's hands on the simulator and the robot.
//!
//! # Modules
//!
//! - [`engine`] – [`PhysicsEngine`]: the seam to the external simulator
//!   (state buffers, forward kinematics, stepping, Jacobians, bias forces).
//! - [`state_writer`] – [`SimulatorStateWriter`]: sole writer of generalized
//!   coordinates, for free-jointed bodies and offset hinge joints.
//! - [`actuator`] – [`CommandSink`]: outbound command channel to the arm.
//! - [`sim`] – [`SimEngine`] and [`RecordingSink`] for headless runs.

pub mod actuator;
pub mod engine;
pub mod sim;
pub mod state_writer;

pub use actuator::{CommandSink, JointCommand, TracingSink};
pub use engine::PhysicsEngine;
pub use sim::{END_EFFECTOR, RecordingSink, SimEngine, SimEngineBuilder};
pub use state_writer::{SimulatorStateWriter, WriterConfig};
