//! Flow compensation for walls that overlap themselves.

use crate::path::{closest_point_on_segment, Point2, Polygon};

/// Lowest flow multiplier a compensated segment may get.
const MIN_FLOW: f64 = 0.1;

/// Per-segment flow multipliers for a closed wall.
pub trait OverlapFlow {
    /// One multiplier in `(0, 1]` per edge of `wall`, edge `i` running from
    /// vertex `i` to vertex `i + 1` (wrapping).
    fn flows(&self, wall: &Polygon, line_width: f64) -> Vec<f64>;
}

/// Reduces flow where a wall passes within one line width of a
/// non-adjacent part of itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProximityOverlap;

impl OverlapFlow for ProximityOverlap {
    fn flows(&self, wall: &Polygon, line_width: f64) -> Vec<f64> {
        let n = wall.points.len();
        if n < 4 || line_width <= 0.0 {
            return vec![1.0; n];
        }

        (0..n)
            .map(|i| {
                let a = wall.points[i];
                let b = wall.points[(i + 1) % n];
                let mid = Point2::from((a.coords + b.coords) / 2.0);
                let nearest = (0..n)
                    .filter(|&j| !is_adjacent(i, j, n))
                    .map(|j| {
                        let c = wall.points[j];
                        let d = wall.points[(j + 1) % n];
                        (closest_point_on_segment(&mid, &c, &d) - mid).norm()
                    })
                    .fold(f64::MAX, f64::min);
                if nearest >= line_width {
                    1.0
                } else {
                    (nearest / line_width).max(MIN_FLOW)
                }
            })
            .collect()
    }
}

fn is_adjacent(i: usize, j: usize, n: usize) -> bool {
    i == j || (i + 1) % n == j || (j + 1) % n == i
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_wide_wall_keeps_full_flow() {
        let wall = Polygon::rect(Point2::origin(), Point2::new(10.0, 10.0));
        let flows = ProximityOverlap.flows(&wall, 0.4);
        assert_eq!(flows, vec![1.0; 4]);
    }

    #[test]
    fn test_narrow_slot_reduces_flow() {
        // 10mm long, 0.2mm wide: the long sides overlap
        let wall = Polygon::rect(Point2::origin(), Point2::new(10.0, 0.2));
        let flows = ProximityOverlap.flows(&wall, 0.4);
        assert_eq!(flows.len(), 4);
        assert_relative_eq!(flows[0], 0.5, epsilon = 1e-9);
        assert_relative_eq!(flows[2], 0.5, epsilon = 1e-9);
        assert!(flows.iter().all(|f| *f > 0.0 && *f <= 1.0));
    }
}
