//! Stale sensor stream handling.
//!
//! The hub knows when each watched topic last delivered a sample; this
//! module decides what a stale topic means for the arm.  The
//! [`StaleStreamMonitor`] reacts only when a topic crosses the line, so a
//! silent stream logs once rather than every cycle.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use simlink_hal::CommandSink;

use crate::safety_gate::SafetyGate;

/// Reaction to a stale stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Keep using the last sample silently.
    Ignore,
    /// Keep using the last sample and log.
    #[default]
    Warn,
    /// Latch the safety gate.
    Halt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Longest gap between samples before a stream counts as stale.
    #[serde(default = "default_stale_timeout_ms")]
    pub stale_timeout_ms: u64,
    #[serde(default)]
    pub policy: StalePolicy,
}

fn default_stale_timeout_ms() -> u64 {
    500
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            stale_timeout_ms: default_stale_timeout_ms(),
            policy: StalePolicy::default(),
        }
    }
}

impl WatchdogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.stale_timeout_ms)
    }
}

/// Topics that changed state in one [`StaleStreamMonitor::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaleTransitions {
    pub went_stale: Vec<String>,
    pub recovered: Vec<String>,
}

/// Applies a [`StalePolicy`] to the stale topics reported each cycle.
#[derive(Debug, Default)]
pub struct StaleStreamMonitor {
    policy: StalePolicy,
    stale: BTreeSet<String>,
}

impl StaleStreamMonitor {
    pub fn new(policy: StalePolicy) -> Self {
        Self {
            policy,
            stale: BTreeSet::new(),
        }
    }

    pub fn policy(&self) -> StalePolicy {
        self.policy
    }

    /// Topics currently considered stale, sorted.
    pub fn stale(&self) -> impl Iterator<Item = &str> {
        self.stale.iter().map(String::as_str)
    }

    /// Compare `stale` with the previous cycle and react to the difference.
    ///
    /// Under [`StalePolicy::Halt`] a newly stale topic latches `gate`.  A
    /// recovered topic never re-arms it.
    pub fn update<S: CommandSink>(&mut self, stale: &[String], gate: &mut SafetyGate<S>) -> StaleTransitions {
        let now: BTreeSet<String> = stale.iter().cloned().collect();
        let transitions = StaleTransitions {
            went_stale: now.difference(&self.stale).cloned().collect(),
            recovered: self.stale.difference(&now).cloned().collect(),
        };

        for topic in &transitions.went_stale {
            match self.policy {
                StalePolicy::Ignore => {}
                StalePolicy::Warn => warn!(topic = %topic, "sensor stream stale; using last sample"),
                StalePolicy::Halt => gate.halt(&format!("sensor stream {topic} stale")),
            }
        }
        if self.policy != StalePolicy::Ignore {
            for topic in &transitions.recovered {
                info!(topic = %topic, "sensor stream recovered");
            }
        }

        self.stale = now;
        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::safety_gate::SafetyConfig;
    use simlink_hal::RecordingSink;

    fn gate() -> SafetyGate<RecordingSink> {
        SafetyGate::new(SafetyConfig::default(), RecordingSink::new())
    }

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn halt_policy_latches_gate_on_first_stale_topic() {
        let mut gate = gate();
        let mut monitor = StaleStreamMonitor::new(StalePolicy::Halt);
        let transitions = monitor.update(&topics(&["/tf"]), &mut gate);
        assert_eq!(transitions.went_stale, topics(&["/tf"]));
        assert!(gate.is_halted());
        // The latch is not a velocity trip.
        assert!(gate.trip().is_none());
    }

    #[test]
    fn recovery_does_not_rearm_gate() {
        let mut gate = gate();
        let mut monitor = StaleStreamMonitor::new(StalePolicy::Halt);
        monitor.update(&topics(&["joint_states"]), &mut gate);
        let transitions = monitor.update(&[], &mut gate);
        assert_eq!(transitions.recovered, topics(&["joint_states"]));
        assert!(gate.is_halted());
        assert_eq!(monitor.stale().count(), 0);
    }

    #[test]
    fn warn_and_ignore_keep_gate_armed() {
        for policy in [StalePolicy::Warn, StalePolicy::Ignore] {
            let mut gate = gate();
            let mut monitor = StaleStreamMonitor::new(policy);
            monitor.update(&topics(&["/tf", "joint_states"]), &mut gate);
            assert!(!gate.is_halted(), "{policy:?}");
        }
    }

    #[test]
    fn only_transitions_are_reported() {
        let mut gate = gate();
        let mut monitor = StaleStreamMonitor::new(StalePolicy::Warn);
        monitor.update(&topics(&["/tf"]), &mut gate);
        let again = monitor.update(&topics(&["/tf", "joint_states"]), &mut gate);
        assert_eq!(again.went_stale, topics(&["joint_states"]));
        assert!(again.recovered.is_empty());
        assert_eq!(monitor.stale().collect::<Vec<_>>(), vec!["/tf", "joint_states"]);
    }

    #[test]
    fn default_config_warns_after_half_a_second() {
        let config = WatchdogConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(config.policy, StalePolicy::Warn);
    }
}
