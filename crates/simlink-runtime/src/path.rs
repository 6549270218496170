//! [`CartesianWaypointPath`] – piecewise-linear end-effector path.
//!
//! # Example
//!
//! ```rust
//! use nalgebra::Vector3;
//! use simlink_runtime::path::CartesianWaypointPath;
//!
//! let start = Vector3::new(0.0, 0.0, 0.5);
//! let via = Vector3::new(0.1, 0.0, 0.5);
//! let goal = Vector3::new(0.1, 0.2, 0.5);
//!
//! // 1 start point + 4 steps to `via` + 5 steps to `goal`.
//! let path = CartesianWaypointPath::piecewise(start, &[via, goal], &[4, 5]).unwrap();
//! assert_eq!(path.len(), 10);
//! assert_eq!(path.points()[4], via);
//! assert_eq!(path.last(), goal);
//! ```

use nalgebra::Vector3;
use simlink_types::BridgeError;

/// Immutable ordered sequence of end-effector target points.
#[derive(Debug, Clone, PartialEq)]
pub struct CartesianWaypointPath {
    points: Vec<Vector3<f64>>,
}

impl CartesianWaypointPath {
    /// Build a path starting at `start` and visiting each of `targets` in
    /// turn, reaching `targets[k]` after `splits[k]` equal sub-steps.
    ///
    /// The result has `1 + splits.iter().sum()` points.  Every segment's last
    /// point is its target exactly; intermediate points are interpolated
    /// from the segment's endpoints, not accumulated.
    ///
    /// # Errors
    ///
    /// [`BridgeError::ConfigurationMismatch`] if `targets` and `splits`
    /// differ in length or a segment has zero steps.
    pub fn piecewise(
        start: Vector3<f64>,
        targets: &[Vector3<f64>],
        splits: &[usize],
    ) -> Result<Self, BridgeError> {
        if targets.len() != splits.len() {
            return Err(BridgeError::ConfigurationMismatch(format!(
                "{} path targets but {} segment lengths",
                targets.len(),
                splits.len()
            )));
        }
        if let Some(k) = splits.iter().position(|n| *n == 0) {
            return Err(BridgeError::ConfigurationMismatch(format!("path segment {k} has no steps")));
        }

        let mut points = Vec::with_capacity(1 + splits.iter().sum::<usize>());
        points.push(start);
        let mut from = start;
        for (target, steps) in targets.iter().zip(splits) {
            for k in 1..=*steps {
                let t = k as f64 / *steps as f64;
                points.push(if k == *steps { *target } else { from.lerp(target, t) });
            }
            from = *target;
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Final target.  A path always holds at least its start point.
    pub fn last(&self) -> Vector3<f64> {
        self.points.last().copied().unwrap_or_else(Vector3::zeros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn straight_line_has_equal_steps() {
        let start = Vector3::new(0.0, 0.0, 0.5);
        let goal = Vector3::new(0.3, 0.1, 0.5);
        let path = CartesianWaypointPath::piecewise(start, &[goal], &[100]).unwrap();
        assert_eq!(path.len(), 101);
        assert_eq!(path.points()[0], start);
        let step = (goal - start) / 100.0;
        for pair in path.points().windows(2) {
            assert_relative_eq!(pair[1] - pair[0], step, epsilon = 1e-12);
        }
        assert_eq!(path.last(), goal);
    }

    #[test]
    fn z_is_interpolated_too() {
        let start = Vector3::new(0.0, 0.0, 0.2);
        let goal = Vector3::new(0.0, 0.0, 0.6);
        let path = CartesianWaypointPath::piecewise(start, &[goal], &[4]).unwrap();
        assert_relative_eq!(path.points()[2].z, 0.4, epsilon = 1e-12);
    }

    #[test]
    fn segment_boundaries_hit_targets_exactly() {
        let start = Vector3::new(0.1, -0.2, 0.4);
        let via = Vector3::new(0.37, 0.11, 0.4);
        let goal = Vector3::new(0.5, 0.3, 0.45);
        let path = CartesianWaypointPath::piecewise(start, &[via, goal], &[1000, 3999]).unwrap();
        assert_eq!(path.len(), 5000);
        assert_eq!(path.points()[1000], via);
        assert_eq!(path.last(), goal);
    }

    #[test]
    fn mismatched_or_empty_segments_are_rejected() {
        let start = Vector3::zeros();
        let goal = Vector3::x();
        assert!(CartesianWaypointPath::piecewise(start, &[goal], &[]).is_err());
        assert!(CartesianWaypointPath::piecewise(start, &[goal], &[0]).is_err());
    }
}
