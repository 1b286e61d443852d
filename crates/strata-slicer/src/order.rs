//! Greedy visiting order for shapes in a layer.
//!
//! Nearest-unvisited-neighbour only: the tour is not optimal, but it is
//! quadratic in the number of shapes and stable (ties keep input order).

use crate::path::{Point2, Polygon, Polyline};

/// Visiting order over shapes represented by one point each.
#[derive(Debug, Clone)]
pub struct PathOrderOptimizer {
    start: Point2,
    representatives: Vec<Point2>,
}

impl PathOrderOptimizer {
    /// Start a tour at `start`.
    pub fn new(start: Point2) -> Self {
        Self {
            start,
            representatives: Vec::new(),
        }
    }

    /// Add a shape by its representative point.
    pub fn add_point(&mut self, representative: Point2) {
        self.representatives.push(representative);
    }

    /// Add a polygon, represented by its first vertex.
    ///
    /// Closed paths start and end on that vertex, so it is also where the
    /// tour continues from.
    pub fn add_polygon(&mut self, polygon: &Polygon) {
        self.add_point(polygon.points.first().copied().unwrap_or(self.start));
    }

    /// Compute the visiting order as indices into the added shapes.
    pub fn optimize(&self) -> Vec<usize> {
        let mut current = self.start;
        let mut remaining: Vec<usize> = (0..self.representatives.len()).collect();
        let mut order = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let mut best_pos = 0;
            let mut best_dist = f64::MAX;
            for (pos, &idx) in remaining.iter().enumerate() {
                let dist = (self.representatives[idx] - current).norm_squared();
                // Strictly closer only, so ties keep input order.
                if dist < best_dist {
                    best_dist = dist;
                    best_pos = pos;
                }
            }
            let idx = remaining.remove(best_pos);
            current = self.representatives[idx];
            order.push(idx);
        }

        order
    }
}

/// Order polygons for printing starting from `start`.
pub fn order_polygons(start: Point2, polygons: &[Polygon]) -> Vec<Polygon> {
    let mut optimizer = PathOrderOptimizer::new(start);
    for polygon in polygons {
        optimizer.add_polygon(polygon);
    }
    optimizer
        .optimize()
        .into_iter()
        .map(|idx| polygons[idx].clone())
        .collect()
}

/// Order polylines for printing starting from `start`.
///
/// Each line may be printed in either direction; the nearer endpoint is
/// entered first and the tour continues from the far one.
pub fn order_polylines(start: Point2, polylines: &[Polyline]) -> Vec<Polyline> {
    let mut current = start;
    let mut remaining: Vec<usize> = (0..polylines.len())
        .filter(|&i| !polylines[i].is_empty())
        .collect();
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_dist = f64::MAX;
        let mut best_reversed = false;
        for (pos, &idx) in remaining.iter().enumerate() {
            let line = &polylines[idx];
            let (Some(first), Some(last)) = (line.start(), line.end()) else {
                continue;
            };
            let to_start = (first - current).norm_squared();
            let to_end = (last - current).norm_squared();
            if to_start < best_dist {
                best_dist = to_start;
                best_pos = pos;
                best_reversed = false;
            }
            if to_end < best_dist {
                best_dist = to_end;
                best_pos = pos;
                best_reversed = true;
            }
        }

        let idx = remaining.remove(best_pos);
        let mut line = polylines[idx].clone();
        if best_reversed {
            line.reverse();
        }
        if let Some(end) = line.end() {
            current = *end;
        }
        ordered.push(line);
    }

    ordered
}
