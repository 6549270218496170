//! `simlink-perception` – where tracked objects are, in simulator terms.
//!
//! # Modules
//!
//! - [`frame`] – [`PoseFrameTransformer`][frame::PoseFrameTransformer]:
//!   re-expresses motion-capture poses relative to the robot base and in the
//!   simulator's axis convention via a data-driven
//!   [`AxisRemap`][frame::AxisRemap].
//! - [`transform`] – [`TfEngine`][transform::TfEngine]: directed graph of
//!   named frames used when poses come from the transform tree instead of
//!   ground-truth tracking.

pub mod frame;
pub mod transform;

pub use frame::{AxisMap, AxisRemap, FrameConfig, PoseFrameTransformer};
pub use transform::TfEngine;
