//! [`RobotBridge`] – the explicit context object tying sensors, simulator and
//! arm together.
//!
//! The bridge owns every handle a cycle touches: the physics engine, the
//! sensor hub, the state writer, the frame transformer, the safety gate and
//! the stale-stream monitor.  Nothing is global.
//!
//! # One cycle
//!
//! 1. Drain the inbound queue into the hub.
//! 2. Ask the hub which watched topics have gone quiet and apply the
//!    stale-stream policy.
//! 3. Mirror the joint state into the simulator.
//! 4. For each tracked object, obtain its pose from the configured source and
//!    write it into its free joint.
//! 5. `engine.forward()` so Jacobians and bias forces are current.
//!
//! Everything runs on the caller's thread; samples only land at drain points
//! (cycle start and each dispatch).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use simlink_hal::{CommandSink, PhysicsEngine, SimulatorStateWriter};
use simlink_kernel::{DispatchOutcome, SafetyGate, StaleStreamMonitor, WatchdogConfig};
use simlink_middleware::{
    ControllerManager, DrainReport, JOINT_STATES_TOPIC, JOINT_VELOCITY_TOPIC, ROBOT_BASE_TOPIC, SensorHub,
    Strictness, SwitchRequest, TF_TOPIC, mocap_topic,
};
use simlink_perception::PoseFrameTransformer;
use simlink_types::{
    ActuationMode, BodyPose, BridgeError, NUM_JOINTS, PoseSource, SwitchOutcome, TrackedObject,
};
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, instrument, warn};

use crate::seeder::{CartesianSeeder, SeedResult};
use crate::task::{SeedTask, TaskGeometry};

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// A tracked object as configured: its stream name doubles as its simulator
/// body name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub name: String,
    #[serde(default = "default_parent_frame")]
    pub parent_frame: String,
    pub target_frame: String,
}

fn default_parent_frame() -> String {
    "/panda_link0".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub pose_source: PoseSource,
    #[serde(default)]
    pub objects: Vec<ObjectConfig>,
    /// Simulator body marking the task goal.
    #[serde(default = "default_goal_body")]
    pub goal_body: String,
    /// Budget shared by the load, service wait and switch calls.
    #[serde(default = "default_switch_timeout_secs")]
    pub switch_timeout_secs: u64,
    /// Controller active on the robot at startup.
    #[serde(default = "default_controller")]
    pub initial_controller: String,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
}

fn default_goal_body() -> String {
    "goal".to_string()
}

fn default_switch_timeout_secs() -> u64 {
    5
}

fn default_controller() -> String {
    "position_joint_trajectory_controller".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            pose_source: PoseSource::default(),
            objects: Vec::new(),
            goal_body: default_goal_body(),
            switch_timeout_secs: default_switch_timeout_secs(),
            initial_controller: default_controller(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

/// What one [`RobotBridge::cycle`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub drained: DrainReport,
    pub joint_state_written: bool,
    pub objects_written: usize,
    /// Objects whose transform lookup failed; their last pose was kept.
    pub lookup_failures: usize,
    pub stale_streams: Vec<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// RobotBridge
// ────────────────────────────────────────────────────────────────────────────

pub struct RobotBridge<E: PhysicsEngine, S: CommandSink> {
    engine: E,
    hub: SensorHub,
    writer: SimulatorStateWriter,
    transformer: PoseFrameTransformer,
    gate: SafetyGate<S>,
    monitor: StaleStreamMonitor,
    config: BridgeConfig,
    /// Last pose written per tracked object, simulator frame.
    last_poses: Vec<Option<BodyPose>>,
    current_controller: String,
}

impl<E: PhysicsEngine, S: CommandSink> RobotBridge<E, S> {
    /// Wire up the bridge and start tracking every configured object.
    ///
    /// # Errors
    ///
    /// [`BridgeError::UnknownBody`] if a configured object has no body of
    /// the same name in the engine.
    pub fn new(
        engine: E,
        mut hub: SensorHub,
        writer: SimulatorStateWriter,
        transformer: PoseFrameTransformer,
        gate: SafetyGate<S>,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError> {
        let max_gap = config.watchdog.timeout();
        hub.watch(JOINT_STATES_TOPIC, max_gap);
        hub.watch(JOINT_VELOCITY_TOPIC, max_gap);
        match config.pose_source {
            PoseSource::GroundTruth => hub.watch(ROBOT_BASE_TOPIC, max_gap),
            PoseSource::TransformTree => hub.watch(TF_TOPIC, max_gap),
        }

        for object in &config.objects {
            let body = engine
                .body_id(&object.name)
                .ok_or_else(|| BridgeError::UnknownBody(object.name.clone()))?;
            hub.track_object(TrackedObject {
                name: object.name.clone(),
                parent_frame: object.parent_frame.clone(),
                target_frame: object.target_frame.clone(),
                body,
                pose: BodyPose::identity(),
                received: false,
            });
            if config.pose_source == PoseSource::GroundTruth {
                hub.watch(mocap_topic(&object.name), max_gap);
            }
        }
        let tracked = hub.tracked_objects().len();
        info!(
            objects = tracked,
            source = ?config.pose_source,
            controller = %config.initial_controller,
            "bridge ready"
        );

        Ok(Self {
            engine,
            hub,
            writer,
            transformer,
            gate,
            monitor: StaleStreamMonitor::new(config.watchdog.policy),
            last_poses: vec![None; tracked],
            current_controller: config.initial_controller.clone(),
            config,
        })
    }

    /// Drain, refresh simulated state, and re-evaluate kinematics.
    #[instrument(skip_all)]
    pub fn cycle(&mut self) -> CycleReport {
        let drained = self.hub.drain();
        let stale_streams = self.hub.stale_topics(Instant::now());
        self.monitor.update(&stale_streams, &mut self.gate);

        let mut report = CycleReport {
            drained,
            stale_streams,
            ..CycleReport::default()
        };

        if self.hub.has_joint_state() {
            match self.writer.write_joint_state(&mut self.engine, self.hub.joint_state()) {
                Ok(()) => report.joint_state_written = true,
                Err(e) => warn!(error = %e, "joint state not mirrored"),
            }
        }

        for (index, object) in self.hub.tracked_objects().iter().enumerate() {
            let pose = match self.config.pose_source {
                PoseSource::GroundTruth => object
                    .received
                    .then(|| self.transformer.transform(&object.name, &object.pose, self.hub.robot_base())),
                PoseSource::TransformTree => {
                    match self.hub.transforms().lookup(&object.parent_frame, &object.target_frame) {
                        Ok(iso) => Some(BodyPose::from_isometry(&iso)),
                        Err(e) => {
                            debug!(object = %object.name, error = %e, "keeping last pose");
                            report.lookup_failures += 1;
                            self.last_poses[index]
                        }
                    }
                }
            };
            let Some(pose) = pose else {
                continue;
            };
            match self.writer.set_body_pose(&mut self.engine, object.body, &pose) {
                Ok(()) => {
                    self.last_poses[index] = Some(pose);
                    report.objects_written += 1;
                }
                Err(e) => warn!(object = %object.name, error = %e, "object pose not written"),
            }
        }
        if report.lookup_failures > 0 {
            warn!(failures = report.lookup_failures, "transform lookups failed this cycle");
        }

        self.engine.forward();
        report
    }

    /// Cycle until the first joint state arrives, sleeping `poll` between
    /// cycles.  Returns the number of cycles used.
    ///
    /// # Errors
    ///
    /// [`BridgeError::ServiceUnavailable`] after `max_cycles` without a
    /// joint state.
    pub async fn wait_for_first_sample(&mut self, poll: Duration, max_cycles: usize) -> Result<usize, BridgeError> {
        for attempt in 1..=max_cycles {
            self.cycle();
            if self.hub.has_joint_state() {
                info!(cycles = attempt, "first joint state received");
                return Ok(attempt);
            }
            tokio::time::sleep(poll).await;
        }
        Err(BridgeError::ServiceUnavailable(format!(
            "no joint state after {max_cycles} cycles"
        )))
    }

    /// Load `controller`, wait for the switch service, then switch from the
    /// current controller.  The whole exchange shares one
    /// `switch_timeout_secs` budget; a manager that stops answering at any
    /// point yields [`SwitchOutcome::Unreachable`].  Never retries.
    #[instrument(skip(self, manager))]
    pub async fn request_controller_switch<M>(&mut self, manager: &M, controller: &str) -> SwitchOutcome
    where
        M: ControllerManager + ?Sized,
    {
        let budget = Duration::from_secs(self.config.switch_timeout_secs);
        let deadline = Instant::now() + budget;

        match timeout_at(deadline, manager.load_controller(controller)).await {
            Ok(Ok(true)) => debug!(controller, "controller loaded"),
            Ok(Ok(false)) => warn!(controller, "load refused; it may already be loaded"),
            Ok(Err(e)) => {
                error!(controller, error = %e, "controller manager unreachable");
                return SwitchOutcome::Unreachable;
            }
            Err(_) => {
                error!(controller, waited_secs = budget.as_secs(), "load request got no answer");
                return SwitchOutcome::Unreachable;
            }
        }

        match timeout_at(deadline, manager.wait_for_switch_service()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "switch service unavailable");
                return SwitchOutcome::Unreachable;
            }
            Err(_) => {
                error!(waited_secs = budget.as_secs(), "switch service did not come up");
                return SwitchOutcome::Unreachable;
            }
        }

        let request = SwitchRequest {
            start: vec![controller.to_string()],
            stop: vec![self.current_controller.clone()],
            strictness: Strictness::BestEffort,
            start_asap: false,
        };
        match timeout_at(deadline, manager.switch_controller(&request)).await {
            Ok(Ok(true)) => {
                info!(from = %self.current_controller, to = controller, "controller switched");
                self.current_controller = controller.to_string();
                SwitchOutcome::Ok
            }
            Ok(Ok(false)) => {
                error!(controller, "controller switch rejected");
                SwitchOutcome::Rejected
            }
            Ok(Err(e)) => {
                error!(controller, error = %e, "controller switch failed");
                SwitchOutcome::Unreachable
            }
            Err(_) => {
                error!(controller, waited_secs = budget.as_secs(), "switch request got no answer");
                SwitchOutcome::Unreachable
            }
        }
    }

    /// Send `command` to the arm through the safety gate.
    pub fn dispatch(&mut self, mode: ActuationMode, command: &[f64; NUM_JOINTS]) -> Result<DispatchOutcome, BridgeError> {
        self.gate.dispatch(&mut self.hub, mode, command)
    }

    /// Seed `task` on the live engine.  The engine is advanced by the full
    /// horizon; callers wanting to keep the current state clone it first.
    pub fn seed(&mut self, seeder: &CartesianSeeder, task: &dyn SeedTask, object: &str) -> Result<SeedResult, BridgeError> {
        let geometry = TaskGeometry::from_engine(
            &mut self.engine,
            &seeder.config().end_effector,
            &self.config.goal_body,
            object,
        )?;
        seeder.build(&mut self.engine, task, &geometry)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn hub(&self) -> &SensorHub {
        &self.hub
    }

    pub fn gate(&self) -> &SafetyGate<S> {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut SafetyGate<S> {
        &mut self.gate
    }

    pub fn current_controller(&self) -> &str {
        &self.current_controller
    }

    /// Tear down every subscription.
    pub fn shutdown(&mut self) {
        self.hub.shutdown();
        info!("bridge shut down");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seeder::SeederConfig;
    use crate::task::ReachTask;
    use approx::assert_relative_eq;
    use nalgebra::{Quaternion, Vector3};
    use simlink_hal::{RecordingSink, SimEngine, WriterConfig};
    use simlink_kernel::{GateState, SafetyConfig, StalePolicy};
    use simlink_middleware::{SensorPublisher, SimControllerManager, SimServiceBehaviour, sensor_channel};
    use simlink_perception::FrameConfig;
    use simlink_types::{SensorMessage, SensorPayload};

    fn bridge_with(config: BridgeConfig) -> (SensorPublisher, RobotBridge<SimEngine, RecordingSink>) {
        let (tx, rx) = sensor_channel(256);
        let engine = SimEngine::builder().free_body("goal").free_body("cheezit").build();
        let bridge = RobotBridge::new(
            engine,
            SensorHub::with_robot_topics(rx),
            SimulatorStateWriter::new(&WriterConfig::default()),
            PoseFrameTransformer::new(&FrameConfig::default()).unwrap(),
            SafetyGate::new(SafetyConfig::default(), RecordingSink::new()),
            config,
        )
        .unwrap();
        (tx, bridge)
    }

    fn cheezit_config(source: PoseSource) -> BridgeConfig {
        BridgeConfig {
            pose_source: source,
            objects: vec![ObjectConfig {
                name: "cheezit".into(),
                parent_frame: "/panda_link0".into(),
                target_frame: "/ar_marker_3".into(),
            }],
            ..BridgeConfig::default()
        }
    }

    fn joints(tx: &SensorPublisher, value: f64) {
        tx.publish(SensorMessage::new(
            JOINT_STATES_TOPIC,
            SensorPayload::JointPositions(vec![value; NUM_JOINTS]),
        ))
        .unwrap();
    }

    #[test]
    fn unknown_object_fails_at_startup() {
        let (_tx, rx) = sensor_channel(8);
        let config = BridgeConfig {
            objects: vec![ObjectConfig {
                name: "mug".into(),
                parent_frame: "/panda_link0".into(),
                target_frame: "/ar_marker_9".into(),
            }],
            ..BridgeConfig::default()
        };
        let result = RobotBridge::new(
            SimEngine::builder().build(),
            SensorHub::with_robot_topics(rx),
            SimulatorStateWriter::new(&WriterConfig::default()),
            PoseFrameTransformer::new(&FrameConfig::default()).unwrap(),
            SafetyGate::new(SafetyConfig::default(), RecordingSink::new()),
            config,
        );
        assert!(matches!(result, Err(BridgeError::UnknownBody(name)) if name == "mug"));
    }

    #[test]
    fn cycle_mirrors_joints_and_runs_forward() {
        let (tx, mut bridge) = bridge_with(BridgeConfig::default());
        joints(&tx, 0.2);
        let before = bridge.engine().forward_calls();
        let report = bridge.cycle();
        assert!(report.joint_state_written);
        assert_eq!(bridge.engine().forward_calls(), before + 1);
        assert_eq!(bridge.engine().qpos()[0], 0.2);
        assert_relative_eq!(bridge.engine().qpos()[5], 0.2 - std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn ground_truth_pose_goes_through_the_frame_remap() {
        let (tx, mut bridge) = bridge_with(cheezit_config(PoseSource::GroundTruth));
        tx.publish(SensorMessage::new(
            ROBOT_BASE_TOPIC,
            SensorPayload::Pose(BodyPose::new(Vector3::new(1.0, 0.0, 1.0), Quaternion::identity())),
        ))
        .unwrap();
        tx.publish(SensorMessage::new(
            mocap_topic("cheezit"),
            SensorPayload::Pose(BodyPose::new(Vector3::new(1.5, 0.3, 0.8), Quaternion::identity())),
        ))
        .unwrap();
        let report = bridge.cycle();
        assert_eq!(report.objects_written, 1);

        let body = bridge.engine().body_id("cheezit").unwrap();
        let p = bridge.engine().body_position(body);
        // (0.5, 0.3, -0.2) external -> (0.5, 0.2, 0.3) simulator
        assert_relative_eq!(p, Vector3::new(0.5, 0.2, 0.3), epsilon = 1e-12);
    }

    #[test]
    fn object_without_samples_is_not_written() {
        let (_tx, mut bridge) = bridge_with(cheezit_config(PoseSource::GroundTruth));
        let report = bridge.cycle();
        assert_eq!(report.objects_written, 0);
    }

    #[test]
    fn transform_tree_lookup_failure_is_skipped() {
        let (tx, mut bridge) = bridge_with(cheezit_config(PoseSource::TransformTree));
        tx.publish(SensorMessage::new(
            TF_TOPIC,
            SensorPayload::Transform {
                parent: "/panda_link0".into(),
                child: "/ar_marker_3".into(),
                pose: BodyPose::new(Vector3::new(0.4, -0.1, 0.2), Quaternion::identity()),
            },
        ))
        .unwrap();
        let first = bridge.cycle();
        assert_eq!(first.objects_written, 1);
        assert_eq!(first.lookup_failures, 0);

        // A second bridge with no tree never resolves and writes nothing.
        let (_tx2, mut empty) = bridge_with(cheezit_config(PoseSource::TransformTree));
        let report = empty.cycle();
        assert_eq!(report.lookup_failures, 1);
        assert_eq!(report.objects_written, 0);

        // The resolved bridge keeps writing the same pose.
        let again = bridge.cycle();
        assert_eq!(again.objects_written, 1);
        let body = bridge.engine().body_id("cheezit").unwrap();
        assert_relative_eq!(bridge.engine().body_position(body), Vector3::new(0.4, -0.1, 0.2), epsilon = 1e-12);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_stream_with_halt_policy_latches_gate() {
        let mut config = BridgeConfig::default();
        config.watchdog.policy = StalePolicy::Halt;
        let (tx, mut bridge) = bridge_with(config);
        tokio::time::advance(Duration::from_millis(400)).await;
        joints(&tx, 0.1);
        assert!(bridge.cycle().stale_streams.is_empty());
        assert_eq!(bridge.gate().state(), GateState::Armed);

        // Joint states were refreshed at 400 ms; the other streams never spoke.
        tokio::time::advance(Duration::from_millis(200)).await;
        let report = bridge.cycle();
        assert!(!report.stale_streams.contains(&JOINT_STATES_TOPIC.to_string()));
        assert!(report.stale_streams.contains(&JOINT_VELOCITY_TOPIC.to_string()));
        assert_eq!(bridge.gate().state(), GateState::Halted);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_stream_with_warn_policy_keeps_gate_armed() {
        let (_tx, mut bridge) = bridge_with(BridgeConfig::default());
        tokio::time::advance(Duration::from_millis(600)).await;
        let report = bridge.cycle();
        assert!(report.stale_streams.contains(&JOINT_STATES_TOPIC.to_string()));
        assert_eq!(bridge.gate().state(), GateState::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn samples_delivered_at_dispatch_keep_stream_fresh() {
        let mut config = BridgeConfig::default();
        config.watchdog.policy = StalePolicy::Halt;
        let (tx, mut bridge) = bridge_with(config);
        tokio::time::advance(Duration::from_millis(400)).await;
        joints(&tx, 0.2);
        bridge.dispatch(ActuationMode::Torque, &[0.0; NUM_JOINTS]).unwrap();
        tokio::time::advance(Duration::from_millis(200)).await;
        let report = bridge.cycle();
        assert!(!report.stale_streams.contains(&JOINT_STATES_TOPIC.to_string()));
    }

    #[test]
    fn dispatch_goes_through_gate_and_drains() {
        let (tx, mut bridge) = bridge_with(BridgeConfig::default());
        joints(&tx, 0.3);
        let outcome = bridge.dispatch(ActuationMode::Torque, &[1.0; NUM_JOINTS]).unwrap();
        assert_eq!(outcome, DispatchOutcome::Published([1.0; NUM_JOINTS]));
        assert!(bridge.hub().has_joint_state());
        assert_eq!(bridge.gate().sink().published().len(), 1);
    }

    #[test]
    fn seed_runs_on_the_live_engine() {
        let (_tx, mut bridge) = bridge_with(cheezit_config(PoseSource::GroundTruth));
        let seeder = CartesianSeeder::new(SeederConfig {
            horizon: 300,
            ..SeederConfig::default()
        })
        .unwrap();
        let result = bridge.seed(&seeder, &ReachTask::default(), "cheezit").unwrap();
        assert_eq!(result.controls.len(), 300);
        assert_eq!(bridge.engine().steps(), 300);
    }

    #[tokio::test]
    async fn first_sample_wait_returns_once_joints_arrive() {
        let (tx, mut bridge) = bridge_with(BridgeConfig::default());
        joints(&tx, 0.1);
        let cycles = bridge.wait_for_first_sample(Duration::from_millis(1), 10).await.unwrap();
        assert_eq!(cycles, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_sample_wait_is_bounded() {
        let (_tx, mut bridge) = bridge_with(BridgeConfig::default());
        let result = bridge.wait_for_first_sample(Duration::from_millis(100), 5).await;
        assert!(matches!(result, Err(BridgeError::ServiceUnavailable(_))));
    }

    #[tokio::test]
    async fn accepted_switch_updates_current_controller() {
        let (_tx, mut bridge) = bridge_with(BridgeConfig::default());
        let manager = SimControllerManager::new(SimServiceBehaviour::Accept);
        let outcome = bridge
            .request_controller_switch(&manager, "effort_group_effort_controller")
            .await;
        assert_eq!(outcome, SwitchOutcome::Ok);
        assert_eq!(bridge.current_controller(), "effort_group_effort_controller");

        let requests = manager.requests().await;
        assert_eq!(requests[0].stop, vec!["position_joint_trajectory_controller".to_string()]);
        assert_eq!(requests[0].strictness, Strictness::BestEffort);
        assert!(!requests[0].start_asap);
    }

    #[tokio::test]
    async fn rejected_switch_keeps_current_controller() {
        let (_tx, mut bridge) = bridge_with(BridgeConfig::default());
        let manager = SimControllerManager::new(SimServiceBehaviour::Reject);
        let outcome = bridge
            .request_controller_switch(&manager, "effort_group_effort_controller")
            .await;
        assert_eq!(outcome, SwitchOutcome::Rejected);
        assert_eq!(bridge.current_controller(), "position_joint_trajectory_controller");
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_switch_service_reports_failure() {
        let (tx, mut bridge) = bridge_with(BridgeConfig::default());
        let manager = SimControllerManager::new(SimServiceBehaviour::Unreachable);
        let started = tokio::time::Instant::now();
        let outcome = bridge
            .request_controller_switch(&manager, "effort_group_effort_controller")
            .await;
        assert_eq!(outcome, SwitchOutcome::Unreachable);
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(manager.requests().await.is_empty());

        // The bridge keeps working afterwards.
        joints(&tx, 0.0);
        assert!(bridge.cycle().joint_state_written);
        assert_eq!(bridge.gate().state(), GateState::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_load_request_is_bounded() {
        let (_tx, mut bridge) = bridge_with(BridgeConfig::default());
        let manager = SimControllerManager::new(SimServiceBehaviour::Unresponsive);
        let started = tokio::time::Instant::now();
        let outcome = bridge
            .request_controller_switch(&manager, "effort_group_effort_controller")
            .await;
        assert_eq!(outcome, SwitchOutcome::Unreachable);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6), "{elapsed:?}");
        assert_eq!(bridge.current_controller(), "position_joint_trajectory_controller");
    }

    /// Answers the load after `load_delay`, then never answers the switch.
    struct StallingSwitch {
        load_delay: Duration,
    }

    #[async_trait::async_trait]
    impl ControllerManager for StallingSwitch {
        async fn load_controller(&self, _name: &str) -> Result<bool, BridgeError> {
            tokio::time::sleep(self.load_delay).await;
            Ok(true)
        }

        async fn wait_for_switch_service(&self) -> Result<(), BridgeError> {
            Ok(())
        }

        async fn switch_controller(&self, _request: &SwitchRequest) -> Result<bool, BridgeError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn load_wait_and_switch_share_one_budget() {
        let (_tx, mut bridge) = bridge_with(BridgeConfig::default());
        let manager = StallingSwitch {
            load_delay: Duration::from_secs(3),
        };
        let started = tokio::time::Instant::now();
        let outcome = bridge
            .request_controller_switch(&manager, "effort_group_effort_controller")
            .await;
        assert_eq!(outcome, SwitchOutcome::Unreachable);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6), "{elapsed:?}");
    }
}
