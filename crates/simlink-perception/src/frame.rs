//! Re-expressing externally tracked poses in the simulator's body frame.
//!
//! The motion-capture system reports poses in its own world frame with a
//! different up axis than the simulator.  [`PoseFrameTransformer`] makes the
//! pose relative to the robot base (the simulator origin) and then permutes
//! the axes with an [`AxisRemap`].  The remap is data: the default is the
//! Y-up → Z-up table for the lab setup, other robots supply their own.
//!
//! No filtering happens here.  Each sample is transformed on its own.

use std::collections::HashMap;

use nalgebra::{Quaternion, Vector3};
use serde::{Deserialize, Serialize};
use simlink_types::{BodyPose, BridgeError};
use tracing::warn;

/// One output axis: which input axis feeds it, and with what sign.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisMap {
    pub source: usize,
    pub sign: f64,
}

/// Signed axis permutation from the external frame into the simulator frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRemap {
    pub axes: [AxisMap; 3],
}

impl Default for AxisRemap {
    /// External X → sim X, external −Z → sim Y, external Y → sim Z.
    fn default() -> Self {
        Self {
            axes: [
                AxisMap { source: 0, sign: 1.0 },
                AxisMap { source: 2, sign: -1.0 },
                AxisMap { source: 1, sign: 1.0 },
            ],
        }
    }
}

impl AxisRemap {
    /// The no-op remap.
    pub fn identity() -> Self {
        Self {
            axes: [
                AxisMap { source: 0, sign: 1.0 },
                AxisMap { source: 1, sign: 1.0 },
                AxisMap { source: 2, sign: 1.0 },
            ],
        }
    }

    /// Check that the table is a signed permutation.
    pub fn validate(&self) -> Result<(), BridgeError> {
        let mut seen = [false; 3];
        for (i, axis) in self.axes.iter().enumerate() {
            if axis.source > 2 {
                return Err(BridgeError::ConfigurationMismatch(format!(
                    "axis remap entry {i} reads source axis {}",
                    axis.source
                )));
            }
            if axis.sign != 1.0 && axis.sign != -1.0 {
                return Err(BridgeError::ConfigurationMismatch(format!(
                    "axis remap entry {i} has sign {}, expected ±1",
                    axis.sign
                )));
            }
            if std::mem::replace(&mut seen[axis.source], true) {
                return Err(BridgeError::ConfigurationMismatch(format!(
                    "axis remap reads source axis {} twice",
                    axis.source
                )));
            }
        }
        Ok(())
    }

    pub fn apply(&self, v: &Vector3<f64>) -> Vector3<f64> {
        Vector3::from_fn(|i, _| self.axes[i].sign * v[self.axes[i].source])
    }

    /// Remap the vector part of `q`; the scalar part passes through.
    pub fn apply_quat(&self, q: &Quaternion<f64>) -> Quaternion<f64> {
        let v = self.apply(&q.imag());
        Quaternion::new(q.w, v.x, v.y, v.z)
    }

    /// The remap that undoes this one.
    pub fn inverse(&self) -> Self {
        let mut axes = [AxisMap { source: 0, sign: 1.0 }; 3];
        for (out, axis) in self.axes.iter().enumerate() {
            axes[axis.source] = AxisMap {
                source: out,
                sign: axis.sign,
            };
        }
        Self { axes }
    }
}

/// Serde-facing settings for [`PoseFrameTransformer`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameConfig {
    #[serde(default)]
    pub remap: AxisRemap,
    /// Per-object position offsets, in simulator axes, added after remapping.
    #[serde(default)]
    pub object_offsets: HashMap<String, [f64; 3]>,
}

/// Maps tracked poses from the motion-capture frame into the simulator frame.
#[derive(Debug, Clone)]
pub struct PoseFrameTransformer {
    remap: AxisRemap,
    offsets: HashMap<String, Vector3<f64>>,
    warned_missing_base: bool,
}

impl PoseFrameTransformer {
    /// # Errors
    ///
    /// [`BridgeError::ConfigurationMismatch`] if the remap is not a signed
    /// permutation.
    pub fn new(config: &FrameConfig) -> Result<Self, BridgeError> {
        config.remap.validate()?;
        Ok(Self {
            remap: config.remap,
            offsets: config
                .object_offsets
                .iter()
                .map(|(name, o)| (name.clone(), Vector3::new(o[0], o[1], o[2])))
                .collect(),
            warned_missing_base: false,
        })
    }

    pub fn remap(&self) -> &AxisRemap {
        &self.remap
    }

    /// Re-express `object` (external frame) in the simulator frame.
    ///
    /// The base's position is subtracted component-wise; its orientation is
    /// not applied.  With `base == None` the origin is used, which is wrong
    /// for any real setup, so it is reported once rather than hidden.
    pub fn transform(&mut self, name: &str, object: &BodyPose, base: Option<&BodyPose>) -> BodyPose {
        let base_position = match base {
            Some(base) => base.position,
            None => {
                if !self.warned_missing_base {
                    warn!(object = name, "no robot base pose received yet; using the origin");
                    self.warned_missing_base = true;
                }
                Vector3::zeros()
            }
        };

        let mut position = self.remap.apply(&(object.position - base_position));
        if let Some(offset) = self.offsets.get(name) {
            position += offset;
        }
        BodyPose::new(position, self.remap.apply_quat(&object.orientation))
    }
}
