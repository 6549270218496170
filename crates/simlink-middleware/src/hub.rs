//! [`SensorHub`] – latest-sample store fed by the inbound queue.
//!
//! Topic handlers are a plain mapping from topic name to [`Route`], built at
//! startup with [`SensorHub::subscribe`] / [`SensorHub::track_object`] and
//! torn down with [`SensorHub::shutdown`].  [`SensorHub::drain`] applies every
//! queued sample in arrival order; the last sample on a topic wins.
//!
//! Topics registered with [`SensorHub::watch`] also carry a freshness
//! deadline: [`SensorHub::stale_topics`] lists those whose last applied
//! sample is older than their allowed gap.
//!
//! | Topic | Route |
//! |---|---|
//! | [`JOINT_STATES_TOPIC`] | joint positions |
//! | [`JOINT_VELOCITY_TOPIC`] | joint velocities |
//! | [`ROBOT_BASE_TOPIC`] | robot-base pose |
//! | `/mocap/rigid_bodies/<name>/pose` | tracked object |
//! | [`TF_TOPIC`] | transform-tree edges |

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use nalgebra::{Isometry3, Translation3, UnitQuaternion};
use simlink_perception::TfEngine;
use simlink_types::{BodyPose, JointState, NUM_JOINTS, SensorMessage, SensorPayload, TrackedObject};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::bus::InboundQueue;

pub const JOINT_STATES_TOPIC: &str = "joint_states";
pub const JOINT_VELOCITY_TOPIC: &str = "/franka_state_controller/franka_states";
pub const ROBOT_BASE_TOPIC: &str = "/mocap/rigid_bodies/pandaRobot/pose";
pub const TF_TOPIC: &str = "/tf";

/// Motion-capture topic for a rigid body called `name`.
pub fn mocap_topic(name: &str) -> String {
    format!("/mocap/rigid_bodies/{name}/pose")
}

/// What to do with a sample arriving on a subscribed topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    JointPositions,
    JointVelocities,
    RobotBase,
    /// Index into [`SensorHub::tracked_objects`].
    TrackedObject(usize),
    TransformTree,
}

/// Summary of one [`SensorHub::drain`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    pub applied: usize,
    pub dropped: usize,
    /// Topics that delivered at least one applied sample, first-seen order.
    pub topics: Vec<String>,
}

/// Freshness deadline of a watched topic.
#[derive(Debug, Clone, Copy)]
struct Freshness {
    last_applied: Instant,
    max_gap: Duration,
}

pub struct SensorHub {
    queue: InboundQueue,
    routes: HashMap<String, Route>,
    freshness: BTreeMap<String, Freshness>,
    joint_state: JointState,
    has_positions: bool,
    robot_base: Option<BodyPose>,
    tracked: Vec<TrackedObject>,
    transforms: TfEngine,
}

impl SensorHub {
    /// A hub with no subscriptions.
    pub fn new(queue: InboundQueue) -> Self {
        Self {
            queue,
            routes: HashMap::new(),
            freshness: BTreeMap::new(),
            joint_state: JointState::default(),
            has_positions: false,
            robot_base: None,
            tracked: Vec::new(),
            transforms: TfEngine::new(),
        }
    }

    /// A hub subscribed to the joint, velocity, base and transform topics.
    pub fn with_robot_topics(queue: InboundQueue) -> Self {
        let mut hub = Self::new(queue);
        hub.subscribe(JOINT_STATES_TOPIC, Route::JointPositions);
        hub.subscribe(JOINT_VELOCITY_TOPIC, Route::JointVelocities);
        hub.subscribe(ROBOT_BASE_TOPIC, Route::RobotBase);
        hub.subscribe(TF_TOPIC, Route::TransformTree);
        hub
    }

    /// Route `topic` to `route`, replacing any earlier handler.
    pub fn subscribe(&mut self, topic: impl Into<String>, route: Route) {
        self.routes.insert(topic.into(), route);
    }

    /// Start tracking `object` on its motion-capture topic. Returns its index.
    pub fn track_object(&mut self, object: TrackedObject) -> usize {
        let index = self.tracked.len();
        self.subscribe(mocap_topic(&object.name), Route::TrackedObject(index));
        self.tracked.push(object);
        index
    }

    /// Expect a sample on `topic` at least every `max_gap`.  The first
    /// deadline runs from now.
    pub fn watch(&mut self, topic: impl Into<String>, max_gap: Duration) {
        self.freshness.insert(
            topic.into(),
            Freshness {
                last_applied: Instant::now(),
                max_gap,
            },
        );
    }

    /// Watched topics whose last applied sample is older than their gap at
    /// `now`, sorted.
    pub fn stale_topics(&self, now: Instant) -> Vec<String> {
        self.freshness
            .iter()
            .filter(|(_, f)| now.saturating_duration_since(f.last_applied) > f.max_gap)
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    /// Drop every subscription and close the queue.
    pub fn shutdown(&mut self) {
        self.routes.clear();
        self.freshness.clear();
        self.queue.close();
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    /// Apply every pending sample.
    pub fn drain(&mut self) -> DrainReport {
        let mut report = DrainReport::default();
        let now = Instant::now();
        for message in self.queue.drain() {
            let Some(route) = self.routes.get(&message.topic).copied() else {
                debug!(topic = %message.topic, "no handler for topic; sample dropped");
                report.dropped += 1;
                continue;
            };
            if self.apply(route, &message) {
                report.applied += 1;
                if let Some(freshness) = self.freshness.get_mut(&message.topic) {
                    freshness.last_applied = now;
                }
                if !report.topics.contains(&message.topic) {
                    report.topics.push(message.topic);
                }
            } else {
                report.dropped += 1;
            }
        }
        report
    }

    fn apply(&mut self, route: Route, message: &SensorMessage) -> bool {
        match (route, &message.payload) {
            (Route::JointPositions, SensorPayload::JointPositions(values)) => {
                match copy_joints(&message.topic, values) {
                    Some(position) => {
                        self.joint_state.position = position;
                        self.has_positions = true;
                        true
                    }
                    None => false,
                }
            }
            (Route::JointVelocities, SensorPayload::JointVelocities(values)) => {
                match copy_joints(&message.topic, values) {
                    Some(velocity) => {
                        self.joint_state.velocity = velocity;
                        true
                    }
                    None => false,
                }
            }
            (Route::RobotBase, SensorPayload::Pose(pose)) => {
                self.robot_base = Some(*pose);
                true
            }
            (Route::TrackedObject(index), SensorPayload::Pose(pose)) => match self.tracked.get_mut(index) {
                Some(object) => {
                    object.pose = *pose;
                    object.received = true;
                    true
                }
                None => false,
            },
            (Route::TransformTree, SensorPayload::Transform { parent, child, pose }) => {
                let iso = Isometry3::from_parts(
                    Translation3::from(pose.position),
                    UnitQuaternion::from_quaternion(pose.orientation),
                );
                self.transforms.set_transform(parent, child, iso);
                true
            }
            (route, payload) => {
                warn!(topic = %message.topic, ?route, ?payload, "payload does not match topic handler");
                false
            }
        }
    }

    pub fn joint_state(&self) -> &JointState {
        &self.joint_state
    }

    /// `true` once any joint-position sample has been applied.
    pub fn has_joint_state(&self) -> bool {
        self.has_positions
    }

    pub fn robot_base(&self) -> Option<&BodyPose> {
        self.robot_base.as_ref()
    }

    pub fn tracked_objects(&self) -> &[TrackedObject] {
        &self.tracked
    }

    pub fn transforms(&self) -> &TfEngine {
        &self.transforms
    }
}

fn copy_joints(topic: &str, values: &[f64]) -> Option<[f64; NUM_JOINTS]> {
    if values.len() < NUM_JOINTS {
        warn!(topic, got = values.len(), expected = NUM_JOINTS, "short joint vector ignored");
        return None;
    }
    let mut out = [0.0; NUM_JOINTS];
    out.copy_from_slice(&values[..NUM_JOINTS]);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{SensorPublisher, sensor_channel};
    use nalgebra::{Quaternion, Vector3};
    use simlink_types::BodyId;

    fn hub() -> (SensorPublisher, SensorHub) {
        let (tx, rx) = sensor_channel(64);
        (tx, SensorHub::with_robot_topics(rx))
    }

    fn cheezit() -> TrackedObject {
        TrackedObject {
            name: "cheezit".into(),
            parent_frame: "/panda_link0".into(),
            target_frame: "/ar_marker_3".into(),
            body: BodyId(3),
            pose: BodyPose::identity(),
            received: false,
        }
    }

    #[test]
    fn nothing_applies_until_drain() {
        let (tx, mut hub) = hub();
        tx.publish(SensorMessage::new(JOINT_STATES_TOPIC, SensorPayload::JointPositions(vec![1.0; 7])))
            .unwrap();
        assert!(!hub.has_joint_state());
        let report = hub.drain();
        assert_eq!(report.applied, 1);
        assert!(hub.has_joint_state());
        assert_eq!(hub.joint_state().position, [1.0; 7]);
    }

    #[test]
    fn last_sample_wins() {
        let (tx, mut hub) = hub();
        for v in [0.1, 0.2, 0.3] {
            tx.publish(SensorMessage::new(JOINT_VELOCITY_TOPIC, SensorPayload::JointVelocities(vec![v; 7])))
                .unwrap();
        }
        let report = hub.drain();
        assert_eq!(report.applied, 3);
        assert_eq!(report.topics, vec![JOINT_VELOCITY_TOPIC.to_string()]);
        assert_eq!(hub.joint_state().velocity, [0.3; 7]);
    }

    #[test]
    fn short_joint_vector_is_dropped() {
        let (tx, mut hub) = hub();
        tx.publish(SensorMessage::new(JOINT_STATES_TOPIC, SensorPayload::JointPositions(vec![1.0; 3])))
            .unwrap();
        let report = hub.drain();
        assert_eq!(report.dropped, 1);
        assert!(!hub.has_joint_state());
    }

    #[test]
    fn tracked_object_pose_is_routed_by_name() {
        let (tx, mut hub) = hub();
        let index = hub.track_object(cheezit());
        let pose = BodyPose::new(Vector3::new(0.4, 0.1, 0.9), Quaternion::identity());
        tx.publish(SensorMessage::new(mocap_topic("cheezit"), SensorPayload::Pose(pose)))
            .unwrap();
        hub.drain();
        let object = &hub.tracked_objects()[index];
        assert!(object.received);
        assert_eq!(object.pose, pose);
    }

    #[test]
    fn unknown_topic_and_mismatched_payload_are_dropped() {
        let (tx, mut hub) = hub();
        tx.publish(SensorMessage::new("/nobody", SensorPayload::Pose(BodyPose::identity())))
            .unwrap();
        tx.publish(SensorMessage::new(ROBOT_BASE_TOPIC, SensorPayload::JointPositions(vec![0.0; 7])))
            .unwrap();
        let report = hub.drain();
        assert_eq!(report.applied, 0);
        assert_eq!(report.dropped, 2);
        assert!(hub.robot_base().is_none());
    }

    #[test]
    fn transform_samples_build_the_tree() {
        let (tx, mut hub) = hub();
        tx.publish(SensorMessage::new(
            TF_TOPIC,
            SensorPayload::Transform {
                parent: "/panda_link0".into(),
                child: "/ar_marker_3".into(),
                pose: BodyPose::new(Vector3::new(0.5, 0.0, 0.1), Quaternion::identity()),
            },
        ))
        .unwrap();
        hub.drain();
        let t = hub.transforms().lookup("/panda_link0", "/ar_marker_3").unwrap();
        assert!((t.translation.x - 0.5).abs() < 1e-12);
    }

    #[test]
    fn watched_topic_goes_stale_after_its_gap() {
        let (tx, mut hub) = hub();
        hub.watch(JOINT_STATES_TOPIC, Duration::from_millis(100));
        hub.watch(TF_TOPIC, Duration::from_secs(60));
        let start = Instant::now();
        assert!(hub.stale_topics(start).is_empty());

        let later = start + Duration::from_millis(150);
        assert_eq!(hub.stale_topics(later), vec![JOINT_STATES_TOPIC.to_string()]);
        assert_eq!(hub.stale_topics(start + Duration::from_secs(61)).len(), 2);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn applied_sample_refreshes_only_its_topic() {
        let (tx, mut hub) = hub();
        hub.watch(JOINT_STATES_TOPIC, Duration::from_millis(100));
        hub.watch(JOINT_VELOCITY_TOPIC, Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(80)).await;

        tx.publish(SensorMessage::new(JOINT_STATES_TOPIC, SensorPayload::JointPositions(vec![0.0; 7])))
            .unwrap();
        // A rejected sample does not count as a delivery.
        tx.publish(SensorMessage::new(JOINT_VELOCITY_TOPIC, SensorPayload::JointVelocities(vec![0.0; 2])))
            .unwrap();
        hub.drain();

        tokio::time::advance(Duration::from_millis(50)).await;
        assert_eq!(hub.stale_topics(Instant::now()), vec![JOINT_VELOCITY_TOPIC.to_string()]);
    }

    #[test]
    fn shutdown_tears_down_routes() {
        let (tx, mut hub) = hub();
        hub.watch(JOINT_STATES_TOPIC, Duration::ZERO);
        hub.shutdown();
        assert_eq!(hub.subscriptions().count(), 0);
        assert!(hub.stale_topics(Instant::now() + Duration::from_secs(1)).is_empty());
        assert!(tx
            .publish(SensorMessage::new(JOINT_STATES_TOPIC, SensorPayload::JointPositions(vec![0.0; 7])))
            .is_err());
    }
}
