//! [`SafetyGate`] – the only path from a command vector to the physical arm.
//!
//! Every [`SafetyGate::dispatch`] call runs the same sequence:
//!
//! 1. **Velocity check** (while armed): every measured joint velocity is
//!    compared against the active mode's limit.  A violation latches
//!    [`GateState::Halted`] *before* anything is published.  In torque mode
//!    the violating joint's command is also zeroed.
//! 2. **Halt policy** (once halted, later dispatches): either an all-zero
//!    command ([`HaltPolicy::ZeroCommand`]) or nothing at all
//!    ([`HaltPolicy::Suppress`]).
//! 3. **Publish** through the [`CommandSink`].
//! 4. **Drain** the [`SensorHub`] exactly once, so the caller's next read
//!    sees a consistent snapshot.
//!
//! The halt is one-way for the run.  [`SafetyGate::reset`] exists for an
//! explicit operator action and is never called by the bridge itself.
//!
//! # Example
//!
//! ```
//! use simlink_hal::{JointCommand, RecordingSink};
//! use simlink_kernel::{DispatchOutcome, SafetyConfig, SafetyGate};
//! use simlink_middleware::{SensorHub, sensor_channel};
//! use simlink_types::ActuationMode;
//!
//! let (_tx, rx) = sensor_channel(16);
//! let mut hub = SensorHub::with_robot_topics(rx);
//! let mut gate = SafetyGate::new(SafetyConfig::default(), RecordingSink::new());
//!
//! let outcome = gate.dispatch(&mut hub, ActuationMode::Torque, &[1.0; 7]).unwrap();
//! assert_eq!(outcome, DispatchOutcome::Published([1.0; 7]));
//! ```

use serde::{Deserialize, Serialize};
use simlink_hal::{CommandSink, JointCommand};
use simlink_middleware::{DrainReport, SensorHub};
use simlink_types::{ActuationMode, BridgeError, NUM_JOINTS};
use tracing::{debug, error, warn};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// What a halted gate does with a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltPolicy {
    /// Publish an all-zero command.
    ZeroCommand,
    /// Publish nothing.
    Suppress,
}

/// Safety table for one actuation mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeLimits {
    /// Per-joint |velocity| limit in rad/s.
    pub velocity_limits: [f64; NUM_JOINTS],
    pub halt_policy: HaltPolicy,
    /// Zero a violating joint's command on the dispatch that trips the halt.
    pub zero_violating: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_torque_limits")]
    pub torque: ModeLimits,
    #[serde(default = "default_position_limits")]
    pub position: ModeLimits,
}

fn default_torque_limits() -> ModeLimits {
    ModeLimits {
        velocity_limits: [0.5, 0.5, 0.5, 0.5, 1.0, 1.5, 1.5],
        halt_policy: HaltPolicy::ZeroCommand,
        zero_violating: true,
    }
}

fn default_position_limits() -> ModeLimits {
    ModeLimits {
        velocity_limits: [0.6, 0.5, 0.8, 0.5, 1.0, 2.0, 3.0],
        halt_policy: HaltPolicy::Suppress,
        zero_violating: false,
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            torque: default_torque_limits(),
            position: default_position_limits(),
        }
    }
}

impl SafetyConfig {
    pub fn limits(&self, mode: ActuationMode) -> &ModeLimits {
        match mode {
            ActuationMode::Torque => &self.torque,
            ActuationMode::Position => &self.position,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Gate
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateState {
    Armed,
    /// Latched; only [`SafetyGate::reset`] leaves this state.
    Halted,
}

/// Result of one [`SafetyGate::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispatchOutcome {
    /// These values went to the sink.
    Published([f64; NUM_JOINTS]),
    /// Nothing went to the sink.
    Suppressed,
}

pub struct SafetyGate<S: CommandSink> {
    config: SafetyConfig,
    sink: S,
    state: GateState,
    trip: Option<BridgeError>,
    last_drain: DrainReport,
}

impl<S: CommandSink> SafetyGate<S> {
    pub fn new(config: SafetyConfig, sink: S) -> Self {
        Self {
            config,
            sink,
            state: GateState::Armed,
            trip: None,
            last_drain: DrainReport::default(),
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.state == GateState::Halted
    }

    /// The violation that latched the halt, if it was a velocity trip.
    pub fn trip(&self) -> Option<&BridgeError> {
        self.trip.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// What the drain at the end of the last dispatch applied.
    pub fn last_drain(&self) -> &DrainReport {
        &self.last_drain
    }

    /// Check, sanitize and publish `command`, then drain `hub` once.
    ///
    /// Velocities are read from the hub's current joint state, i.e. the
    /// result of the previous drain.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Publish`] if the sink refuses the command.  The halt
    /// latch and the drain happen regardless.
    pub fn dispatch(
        &mut self,
        hub: &mut SensorHub,
        mode: ActuationMode,
        command: &[f64; NUM_JOINTS],
    ) -> Result<DispatchOutcome, BridgeError> {
        let limits = self.config.limits(mode).clone();
        let mut values = *command;

        let outcome = if self.state == GateState::Armed {
            let velocities = hub.joint_state().velocity;
            for (joint, (velocity, limit)) in velocities.iter().zip(limits.velocity_limits).enumerate() {
                // A non-finite reading counts as a violation.
                if !velocity.is_finite() || velocity.abs() > limit {
                    error!(joint, velocity, limit, ?mode, "joint velocity over limit; halting");
                    if limits.zero_violating {
                        values[joint] = 0.0;
                    }
                    if self.trip.is_none() {
                        self.trip = Some(BridgeError::SafetyLimitExceeded {
                            joint,
                            velocity: *velocity,
                            limit,
                        });
                    }
                    self.state = GateState::Halted;
                }
            }
            DispatchOutcome::Published(values)
        } else {
            match limits.halt_policy {
                HaltPolicy::ZeroCommand => DispatchOutcome::Published([0.0; NUM_JOINTS]),
                HaltPolicy::Suppress => DispatchOutcome::Suppressed,
            }
        };

        let published = match outcome {
            DispatchOutcome::Published(values) => self.sink.publish(&JointCommand { mode, values }),
            DispatchOutcome::Suppressed => {
                debug!(?mode, "gate halted; command suppressed");
                Ok(())
            }
        };

        self.last_drain = hub.drain();
        published.map(|()| outcome)
    }

    /// Latch the halt from outside the velocity check, e.g. on a stale stream.
    pub fn halt(&mut self, reason: &str) {
        if self.state == GateState::Armed {
            error!(reason, "safety gate halted");
        }
        self.state = GateState::Halted;
    }

    /// Re-arm after a halt.  Operator action only.
    pub fn reset(&mut self) {
        warn!(previous = ?self.state, "safety gate re-armed by operator");
        self.state = GateState::Armed;
        self.trip = None;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
