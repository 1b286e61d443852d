//! Polygon and polyline geometry used by the planner.
//!
//! Outer contours are counter-clockwise, holes are clockwise. A "region" is a
//! slice of polygons mixing both, the way the upstream slicer hands them over.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// A point in the XY plane (mm).
pub type Point2 = nalgebra::Point2<f64>;

/// A vector in the XY plane.
pub type Vec2 = Vector2<f64>;

const EPS: f64 = 1e-9;

/// A 2D polygon (closed path).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polygon {
    /// Vertices of the polygon in order.
    pub points: Vec<Point2>,
}

impl Polygon {
    /// Create a new polygon from points.
    pub fn new(points: Vec<Point2>) -> Self {
        Self { points }
    }

    /// Axis-aligned rectangle, counter-clockwise, starting at `min`.
    pub fn rect(min: Point2, max: Point2) -> Self {
        Self::new(vec![
            min,
            Point2::new(max.x, min.y),
            max,
            Point2::new(min.x, max.y),
        ])
    }

    /// Check if the polygon is empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Signed area of the polygon.
    /// Positive for counter-clockwise, negative for clockwise.
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut area = 0.0;
        for i in 0..n {
            let j = (i + 1) % n;
            area += self.points[i].x * self.points[j].y;
            area -= self.points[j].x * self.points[i].y;
        }
        area / 2.0
    }

    /// Is the polygon counter-clockwise?
    pub fn is_ccw(&self) -> bool {
        self.signed_area() > 0.0
    }

    /// Reverse the winding order.
    pub fn reverse(&mut self) {
        self.points.reverse();
    }

    /// Perimeter length, including the closing edge.
    pub fn perimeter(&self) -> f64 {
        let n = self.points.len();
        if n < 2 {
            return 0.0;
        }
        let mut length = 0.0;
        for i in 0..n {
            let j = (i + 1) % n;
            length += (self.points[j] - self.points[i]).norm();
        }
        length
    }

    /// Compute centroid of the polygon vertices.
    pub fn centroid(&self) -> Point2 {
        if self.points.is_empty() {
            return Point2::origin();
        }
        let sum = self
            .points
            .iter()
            .fold(Vec2::zeros(), |acc, p| acc + p.coords);
        Point2::from(sum / self.points.len() as f64)
    }

    /// Closest point on the polygon outline to `target`.
    pub fn closest_point_to(&self, target: &Point2) -> Option<Point2> {
        let n = self.points.len();
        if n == 0 {
            return None;
        }
        let mut best = self.points[0];
        let mut best_dist = f64::MAX;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            let candidate = closest_point_on_segment(target, &a, &b);
            let dist = (candidate - target).norm_squared();
            if dist < best_dist {
                best_dist = dist;
                best = candidate;
            }
        }
        Some(best)
    }

    /// Offset the polygon by `distance` relative to its own interior.
    ///
    /// Positive distances shrink the polygon, negative distances grow it,
    /// regardless of winding. Returns `None` when the result collapses.
    pub fn offset(&self, distance: f64) -> Option<Self> {
        let points = dedup_closed(&self.points);
        let n = points.len();
        if n < 3 {
            return None;
        }
        let source = Polygon::new(points);
        let source_area = source.signed_area();
        if source_area.abs() < EPS {
            return None;
        }
        let sign = source_area.signum();
        let max_offset = distance.abs() * 2.0;

        let mut offset_points = Vec::with_capacity(n);
        for i in 0..n {
            let p0 = source.points[(i + n - 1) % n];
            let p1 = source.points[i];
            let p2 = source.points[(i + 1) % n];

            let e1 = (p1 - p0).normalize();
            let e2 = (p2 - p1).normalize();

            // Left normal for CCW, right normal for CW: both point inside.
            let n1 = Vec2::new(-e1.y * sign, e1.x * sign);
            let n2 = Vec2::new(-e2.y * sign, e2.x * sign);

            let sum = n1 + n2;
            let (bisector, offset_dist) = if sum.norm() < EPS {
                (n1, distance)
            } else {
                let bisector = sum.normalize();
                let dot = n1.dot(&bisector);
                let dist = if dot.abs() > 0.001 { distance / dot } else { distance };
                (bisector, dist)
            };

            // Limit offset to avoid self-intersection at sharp corners
            let clamped = offset_dist.clamp(-max_offset, max_offset);
            offset_points.push(p1 + bisector * clamped);
        }

        let result = Polygon::new(offset_points);
        let area = result.signed_area();
        if area.abs() < 1e-10 || area.signum() != sign {
            return None;
        }
        if distance > 0.0 {
            // A shrinking mitred offset has collapsed once any edge flips direction.
            for i in 0..n {
                let j = (i + 1) % n;
                let before = source.points[j] - source.points[i];
                let after = result.points[j] - result.points[i];
                if before.dot(&after) <= 0.0 {
                    return None;
                }
            }
        }
        Some(result)
    }

    /// Bounding box as `(min, max)`.
    pub fn bounds(&self) -> Option<(Point2, Point2)> {
        bounds(std::slice::from_ref(self))
    }
}

/// An open polyline (non-closed path).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Polyline {
    /// Points along the path.
    pub points: Vec<Point2>,
}

impl Polyline {
    /// Create a new polyline.
    pub fn new(points: Vec<Point2>) -> Self {
        Self { points }
    }

    /// Two-point line segment.
    pub fn segment(a: Point2, b: Point2) -> Self {
        Self::new(vec![a, b])
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Total length of the polyline.
    pub fn length(&self) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        self.points.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
    }

    /// Starting point.
    pub fn start(&self) -> Option<&Point2> {
        self.points.first()
    }

    /// Ending point.
    pub fn end(&self) -> Option<&Point2> {
        self.points.last()
    }

    /// Reverse the direction of travel.
    pub fn reverse(&mut self) {
        self.points.reverse();
    }
}

/// Closest point to `p` on the segment `a`-`b`.
pub fn closest_point_on_segment(p: &Point2, a: &Point2, b: &Point2) -> Point2 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq < EPS * EPS {
        return *a;
    }
    let t = ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Check if a point is inside a polygon (even-odd rule).
pub fn point_in_polygon(point: &Point2, polygon: &Polygon) -> bool {
    let n = polygon.points.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;

    for i in 0..n {
        let pi = &polygon.points[i];
        let pj = &polygon.points[j];

        if ((pi.y > point.y) != (pj.y > point.y))
            && (point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}

/// Check if a point is inside a region.
/// Point must be inside an outer (CCW) contour and outside all holes (CW).
pub fn point_in_region(point: &Point2, region: &[Polygon]) -> bool {
    let mut inside_outer = false;
    for poly in region {
        if !point_in_polygon(point, poly) {
            continue;
        }
        if poly.is_ccw() {
            inside_outer = true;
        } else {
            return false;
        }
    }
    inside_outer
}

/// Net area of a region (outer contours minus holes).
pub fn region_area(region: &[Polygon]) -> f64 {
    region.iter().map(Polygon::signed_area).sum()
}

/// Offset every contour of a region inward by `distance`.
///
/// Outer contours shrink and holes grow; contours that collapse are dropped
/// together with the holes they contained.
pub fn offset_region(region: &[Polygon], distance: f64) -> Vec<Polygon> {
    let mut result = Vec::with_capacity(region.len());
    for part in split_into_parts(region) {
        let Some((outer, holes)) = part.split_first() else {
            continue;
        };
        let Some(shrunk) = outer.offset(distance) else {
            continue;
        };
        result.push(shrunk);
        result.extend(holes.iter().filter_map(|hole| hole.offset(-distance)));
    }
    result
}

/// Split a region into islands: each outer contour followed by its holes.
pub fn split_into_parts(region: &[Polygon]) -> Vec<Vec<Polygon>> {
    associate_holes(region)
        .into_iter()
        .map(|(outer, holes)| {
            let mut part = Vec::with_capacity(holes.len() + 1);
            part.push(region[outer].clone());
            part.extend(holes.into_iter().map(|h| region[h].clone()));
            part
        })
        .collect()
}

/// Associate holes with their parent outer contours.
/// Returns Vec of (outer_index, hole_indices) pairs.
pub fn associate_holes(contours: &[Polygon]) -> Vec<(usize, Vec<usize>)> {
    let outer_indices: Vec<usize> = contours
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_ccw())
        .map(|(i, _)| i)
        .collect();

    let hole_indices: Vec<usize> = contours
        .iter()
        .enumerate()
        .filter(|(_, c)| c.signed_area() < 0.0)
        .map(|(i, _)| i)
        .collect();

    let mut associations: Vec<(usize, Vec<usize>)> =
        outer_indices.iter().map(|&i| (i, Vec::new())).collect();

    for &hole_idx in &hole_indices {
        let Some(pt) = contours[hole_idx].points.first() else {
            continue;
        };
        // Innermost containing outer wins, so nested islands keep their own holes.
        let parent = associations
            .iter_mut()
            .filter(|(outer, _)| point_in_polygon(pt, &contours[*outer]))
            .min_by(|(a, _), (b, _)| {
                contours[*a]
                    .signed_area()
                    .partial_cmp(&contours[*b].signed_area())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        if let Some((_, holes)) = parent {
            holes.push(hole_idx);
        }
    }

    associations
}

/// Bounding box of a set of polygons as `(min, max)`.
pub fn bounds(polygons: &[Polygon]) -> Option<(Point2, Point2)> {
    let mut points = polygons.iter().flat_map(|p| p.points.iter());
    let first = points.next()?;
    let mut min = *first;
    let mut max = *first;
    for pt in points {
        min.x = min.x.min(pt.x);
        min.y = min.y.min(pt.y);
        max.x = max.x.max(pt.x);
        max.y = max.y.max(pt.y);
    }
    Some((min, max))
}

/// Drop consecutive duplicate vertices, including a duplicated closing vertex.
fn dedup_closed(points: &[Point2]) -> Vec<Point2> {
    let mut result: Vec<Point2> = Vec::with_capacity(points.len());
    for p in points {
        if result.last().is_none_or(|last| (p - last).norm() > EPS) {
            result.push(*p);
        }
    }
    while result.len() > 1 && (result[0] - result[result.len() - 1]).norm() <= EPS {
        result.pop();
    }
    result
}
