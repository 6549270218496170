//! `simlink-kernel` – Safety
//!
//! Stands between every command vector and the physical arm.  It does not
//! plan; it enforces limits and latches.
//!
//! # Modules
//!
//! - [`safety_gate`] – [`SafetyGate`][safety_gate::SafetyGate]: velocity
//!   check, one-way halt latch, halt policy per actuation mode, publish, and
//!   one sensor drain per dispatch.
//! - [`watchdog`] – [`StaleStreamMonitor`][watchdog::StaleStreamMonitor]:
//!   turns the hub's stale topics into a log line or a halt, per
//!   [`StalePolicy`][watchdog::StalePolicy].

pub mod safety_gate;
pub mod watchdog;

pub use safety_gate::{DispatchOutcome, GateState, HaltPolicy, ModeLimits, SafetyConfig, SafetyGate};
pub use watchdog::{StalePolicy, StaleStreamMonitor, StaleTransitions, WatchdogConfig};
