//! Transform Frame (TF) Engine.
//!
//! Maintains a directed graph of named reference frames and the rigid-body
//! transforms that relate them.  This is the "transform tree" pose source:
//! when ground-truth motion capture is disabled, each tracked object's pose
//! is obtained by looking up `parent_frame → target_frame` here.
//!
//! # Example
//!
//! ```rust
//! use nalgebra::Isometry3;
//! use simlink_perception::transform::TfEngine;
//!
//! let mut tf = TfEngine::new();
//! tf.set_transform("/panda_link0", "/camera", Isometry3::translation(1.0, 0.0, 0.0));
//! tf.set_transform("/camera", "/ar_marker_3", Isometry3::translation(0.5, 0.0, 0.0));
//!
//! let t = tf.lookup("/panda_link0", "/ar_marker_3").unwrap();
//! assert!((t.translation.x - 1.5).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use nalgebra::Isometry3;
use simlink_types::BridgeError;

/// A directed graph of named frames joined by [`Isometry3`] edges.
///
/// Edges are directional: adding `"A" → "B"` does not create the inverse.
/// [`TfEngine::lookup`] performs a BFS from source to target and composes the
/// transforms along the shortest chain.
#[derive(Debug, Default, Clone)]
pub struct TfEngine {
    /// `edges[parent][child] = T_parent_child`
    edges: HashMap<String, HashMap<String, Isometry3<f64>>>,
}

impl TfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the transform from `parent_frame` to `child_frame`.
    pub fn set_transform(&mut self, parent_frame: &str, child_frame: &str, transform: Isometry3<f64>) {
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), transform);
    }

    /// Number of stored edges.
    pub fn len(&self) -> usize {
        self.edges.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compose the transform that expresses `target_frame` in `source_frame`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::LookupFailure`] when no chain connects the two frames.
    pub fn lookup(&self, source_frame: &str, target_frame: &str) -> Result<Isometry3<f64>, BridgeError> {
        if source_frame == target_frame {
            return Ok(Isometry3::identity());
        }

        let mut queue: VecDeque<(&str, Isometry3<f64>)> = VecDeque::new();
        let mut visited: HashSet<&str> = HashSet::new();
        queue.push_back((source_frame, Isometry3::identity()));
        visited.insert(source_frame);

        while let Some((current, accumulated)) = queue.pop_front() {
            let Some(neighbours) = self.edges.get(current) else {
                continue;
            };
            for (next, edge) in neighbours {
                if !visited.insert(next.as_str()) {
                    continue;
                }
                let composed = accumulated * edge;
                if next == target_frame {
                    return Ok(composed);
                }
                queue.push_back((next.as_str(), composed));
            }
        }

        Err(BridgeError::LookupFailure {
            parent: source_frame.to_string(),
            target: target_frame.to_string(),
        })
    }
}
