//! Inbound sensor channel.
//!
//! The messaging layer (ROS bridge, replay file, in-process simulator) holds
//! a [`SensorPublisher`] and pushes [`SensorMessage`]s whenever a sample
//! arrives.  Nothing is processed on arrival: the bridge owns the matching
//! [`InboundQueue`] and drains it synchronously at well-defined poll points,
//! so readers never observe a half-applied update.
//!
//! The channel is bounded.  When a publisher outruns the bridge the newest
//! sample is refused and logged, in the same spirit as a small subscriber
//! queue on the robot side.

use simlink_types::{BridgeError, SensorMessage};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::warn;

/// Default number of buffered samples before publishers are refused.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Create a connected publisher / queue pair.
pub fn sensor_channel(capacity: usize) -> (SensorPublisher, InboundQueue) {
    let (sender, receiver) = mpsc::channel(capacity);
    (SensorPublisher { sender }, InboundQueue { receiver })
}

/// Producer side. Clone it cheaply; all clones feed the same queue.
#[derive(Clone, Debug)]
pub struct SensorPublisher {
    sender: mpsc::Sender<SensorMessage>,
}

impl SensorPublisher {
    /// Enqueue a sample without blocking.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Publish`] if the queue is full or the bridge has shut
    /// down.
    pub fn publish(&self, message: SensorMessage) -> Result<(), BridgeError> {
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(msg) => {
                warn!(topic = %msg.topic, "inbound queue full; sample dropped");
                BridgeError::Publish(format!("inbound queue full on {}", msg.topic))
            }
            TrySendError::Closed(msg) => {
                BridgeError::Publish(format!("bridge closed; cannot deliver {}", msg.topic))
            }
        })
    }
}

/// Consumer side, owned by the bridge.
#[derive(Debug)]
pub struct InboundQueue {
    receiver: mpsc::Receiver<SensorMessage>,
}

impl InboundQueue {
    /// Take every sample currently queued, in arrival order.
    pub fn drain(&mut self) -> Vec<SensorMessage> {
        let mut out = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(msg) => out.push(msg),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    /// Stop accepting new samples; already queued ones can still be drained.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}
