//! `simlink-middleware` – the bridge's nervous system.
//!
//! Carries sensor samples in and service calls out without interpreting
//! them beyond routing.
//!
//! # Modules
//!
//! - [`bus`] – bounded inbound channel: external adapters publish, the
//!   bridge drains synchronously at its poll points.
//! - [`hub`] – [`SensorHub`]: topic → handler routing and the latest-sample
//!   store for joints, robot base, tracked objects and the transform tree.
//! - [`adapter`] – [`ControllerManager`]: the controller-switch service seam,
//!   plus an in-process [`SimControllerManager`].

pub mod adapter;
pub mod bus;
pub mod hub;

pub use adapter::{ControllerManager, SimControllerManager, SimServiceBehaviour, Strictness, SwitchRequest};
pub use bus::{DEFAULT_CAPACITY, InboundQueue, SensorPublisher, sensor_channel};
pub use hub::{
    DrainReport, JOINT_STATES_TOPIC, JOINT_VELOCITY_TOPIC, ROBOT_BASE_TOPIC, Route, SensorHub, TF_TOPIC,
    mocap_topic,
};
