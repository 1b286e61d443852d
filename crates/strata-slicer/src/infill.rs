//! Fill patterns and the sparse infill dispatcher.
//!
//! Line generation sits behind [`FillGenerator`]; [`ScanlineFill`] is the
//! built-in scan-conversion implementation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::SlicerError;
use crate::path::{offset_region, point_in_region, Point2, Polygon, Polyline, Vec2};

/// Fill pattern types.
///
/// Settings files name patterns as strings. A name outside the known set
/// loads as [`FillPattern::Unknown`]; regions asking for it stay empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FillPattern {
    /// Two crossing line sets.
    #[default]
    Grid,
    /// One line set.
    Lines,
    /// Three line sets at 60° to each other.
    Triangles,
    /// Nested rings following the outline.
    Concentric,
    /// Parallel lines joined at alternating ends.
    ZigZag,
    /// A name that is not a known pattern.
    Unknown(String),
}

impl FillPattern {
    /// Every known pattern.
    pub const ALL: [FillPattern; 5] = [
        FillPattern::Grid,
        FillPattern::Lines,
        FillPattern::Triangles,
        FillPattern::Concentric,
        FillPattern::ZigZag,
    ];

    /// Setting name of the pattern.
    pub fn name(&self) -> &str {
        match self {
            FillPattern::Grid => "grid",
            FillPattern::Lines => "lines",
            FillPattern::Triangles => "triangles",
            FillPattern::Concentric => "concentric",
            FillPattern::ZigZag => "zig_zag",
            FillPattern::Unknown(name) => name,
        }
    }
}

impl fmt::Display for FillPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FillPattern {
    type Err = SlicerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "zigzag" => Ok(FillPattern::ZigZag),
            name => FillPattern::ALL
                .into_iter()
                .find(|p| p.name() == name)
                .ok_or_else(|| SlicerError::UnknownFillPattern(s.to_string())),
        }
    }
}

impl From<String> for FillPattern {
    fn from(name: String) -> Self {
        name.parse().unwrap_or(FillPattern::Unknown(name))
    }
}

impl From<FillPattern> for String {
    fn from(pattern: FillPattern) -> Self {
        pattern.name().to_string()
    }
}

/// Parameters for one fill request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillParams {
    /// Extrusion line width (mm).
    pub line_width: f64,
    /// Distance between lines (mm).
    pub spacing: f64,
    /// How far lines reach into the surrounding walls (% of line width).
    pub overlap: f64,
    /// Line direction (degrees).
    pub angle: f64,
}

impl FillParams {
    /// Fill with no overlap.
    pub fn new(line_width: f64, spacing: f64, angle: f64) -> Self {
        Self {
            line_width,
            spacing,
            overlap: 0.0,
            angle,
        }
    }

    /// Set the overlap percentage.
    pub fn with_overlap(mut self, overlap: f64) -> Self {
        self.overlap = overlap;
        self
    }

    /// Same parameters at a different spacing.
    pub fn with_spacing(mut self, spacing: f64) -> Self {
        self.spacing = spacing;
        self
    }

    /// Same parameters at a different angle.
    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }
}

/// Output of a fill: closed rings, open lines, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fill {
    /// Closed rings (concentric fills, outlines).
    pub polygons: Vec<Polygon>,
    /// Open lines.
    pub lines: Vec<Polyline>,
}

impl Fill {
    /// Fill made of open lines only.
    pub fn from_lines(lines: Vec<Polyline>) -> Self {
        Self {
            polygons: Vec::new(),
            lines,
        }
    }

    /// Fill made of closed rings only.
    pub fn from_polygons(polygons: Vec<Polygon>) -> Self {
        Self {
            polygons,
            lines: Vec::new(),
        }
    }

    /// Check if nothing was generated.
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty() && self.lines.is_empty()
    }
}

/// Pattern line generation for a region.
///
/// Regions are outer contours (CCW) plus holes (CW). Implementations must
/// return nothing for an empty or zero-area region.
pub trait FillGenerator {
    /// Parallel lines at `params.angle`.
    fn lines(&self, region: &[Polygon], params: &FillParams) -> Vec<Polyline>;

    /// Two line sets at `params.angle` and `params.angle + 90°`.
    fn grid(&self, region: &[Polygon], params: &FillParams) -> Vec<Polyline> {
        let mut lines = self.lines(region, params);
        lines.extend(self.lines(region, &params.with_angle(params.angle + 90.0)));
        lines
    }

    /// Three line sets at `params.angle`, `+60°` and `+120°`.
    fn triangles(&self, region: &[Polygon], params: &FillParams) -> Vec<Polyline> {
        let mut lines = Vec::new();
        for step in 0..3 {
            lines.extend(self.lines(region, &params.with_angle(params.angle + 60.0 * step as f64)));
        }
        lines
    }

    /// Nested rings, starting with the region itself and stepping inward by
    /// `params.spacing`.
    fn concentric(&self, region: &[Polygon], params: &FillParams) -> Vec<Polygon>;

    /// Parallel lines, joined end to end when `connected`.
    fn zigzag(&self, region: &[Polygon], params: &FillParams, connected: bool) -> Vec<Polyline>;
}

/// Scan-conversion fill generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanlineFill;

/// Safety bound on concentric rings for one region.
const MAX_RINGS: usize = 10_000;

impl ScanlineFill {
    /// Intersect scanlines with the region. Returns one list of segments per
    /// scanline, in scan order.
    fn scan(&self, region: &[Polygon], params: &FillParams) -> Vec<Vec<Polyline>> {
        if params.spacing <= 0.0 || region.iter().all(|p| p.signed_area().abs() < 1e-12) {
            return Vec::new();
        }

        let grow = params.line_width * params.overlap / 100.0;
        let boundaries = if grow > 0.0 {
            offset_region(region, -grow)
        } else {
            region.to_vec()
        };
        if boundaries.is_empty() {
            return Vec::new();
        }

        let angle = params.angle.to_radians();
        // Direction along lines
        let dir = Vec2::new(angle.cos(), angle.sin());
        // Direction perpendicular (for spacing)
        let perp = Vec2::new(-angle.sin(), angle.cos());

        let mut perp_min = f64::MAX;
        let mut perp_max = f64::MIN;
        for pt in boundaries.iter().flat_map(|p| p.points.iter()) {
            let proj = pt.coords.dot(&perp);
            perp_min = perp_min.min(proj);
            perp_max = perp_max.max(proj);
        }

        let mut scanlines = Vec::new();
        let mut offset = perp_min + params.spacing / 2.0;
        while offset < perp_max {
            let line_origin = Point2::from(perp * offset);
            let mut hits = crossings(&line_origin, &dir, &perp, offset, &boundaries);
            hits.sort_by(f64::total_cmp);

            let mut segments = Vec::new();
            for pair in hits.chunks_exact(2) {
                let p0 = line_origin + dir * pair[0];
                let p1 = line_origin + dir * pair[1];
                if (p1 - p0).norm() < 1e-9 {
                    continue;
                }
                let mid = Point2::from((p0.coords + p1.coords) / 2.0);
                if point_in_region(&mid, &boundaries) {
                    segments.push(Polyline::segment(p0, p1));
                }
            }
            scanlines.push(segments);
            offset += params.spacing;
        }
        scanlines
    }
}

impl FillGenerator for ScanlineFill {
    fn lines(&self, region: &[Polygon], params: &FillParams) -> Vec<Polyline> {
        self.scan(region, params).into_iter().flatten().collect()
    }

    fn concentric(&self, region: &[Polygon], params: &FillParams) -> Vec<Polygon> {
        if params.spacing <= 0.0 {
            return Vec::new();
        }
        let mut rings = Vec::new();
        let mut current: Vec<Polygon> = region
            .iter()
            .filter(|p| p.signed_area().abs() > 1e-12)
            .cloned()
            .collect();
        while !current.is_empty() && rings.len() < MAX_RINGS {
            let next = offset_region(&current, params.spacing);
            rings.append(&mut current);
            current = next;
        }
        rings
    }

    fn zigzag(&self, region: &[Polygon], params: &FillParams, connected: bool) -> Vec<Polyline> {
        let mut result: Vec<Polyline> = Vec::new();
        let mut chain: Option<Polyline> = None;
        let mut forward = true;

        for segments in self.scan(region, params) {
            let single = segments.len() == 1;
            for mut segment in segments {
                if !forward {
                    segment.reverse();
                }
                match chain.as_mut() {
                    Some(run) if connected && single => run.points.extend(segment.points),
                    _ => {
                        result.extend(chain.take());
                        if connected && single {
                            chain = Some(segment);
                        } else {
                            result.push(segment);
                        }
                    }
                }
            }
            if !single {
                result.extend(chain.take());
            }
            forward = !forward;
        }
        result.extend(chain);
        result
    }
}

/// Positions along `dir` where the scanline crosses region edges.
///
/// Edges count on a half-open interval so a scanline passing exactly through
/// a vertex is counted once.
fn crossings(
    origin: &Point2,
    dir: &Vec2,
    perp: &Vec2,
    offset: f64,
    boundaries: &[Polygon],
) -> Vec<f64> {
    let mut hits = Vec::new();
    for poly in boundaries {
        let n = poly.points.len();
        for i in 0..n {
            let a = poly.points[i];
            let b = poly.points[(i + 1) % n];
            let da = a.coords.dot(perp) - offset;
            let db = b.coords.dot(perp) - offset;
            if (da > 0.0) == (db > 0.0) {
                continue;
            }
            let s = da / (da - db);
            let hit = a + (b - a) * s;
            hits.push((hit - origin).dot(dir));
        }
    }
    hits
}

/// Spacing for sparse infill at a combine level.
pub fn combine_spacing(base_spacing: f64, level: usize) -> f64 {
    base_spacing * (level + 1) as f64
}

/// Generate sparse infill for one combine level.
///
/// Grid and triangles spread their line sets so the overall density matches
/// `params.spacing`. Concentric ignores the angle and starts on the region
/// outline. Zigzag runs are left unconnected. An unknown pattern is logged
/// and produces nothing.
pub fn sparse_infill(
    generator: &dyn FillGenerator,
    pattern: &FillPattern,
    region: &[Polygon],
    params: &FillParams,
) -> Fill {
    match pattern {
        FillPattern::Grid => {
            Fill::from_lines(generator.grid(region, &params.with_spacing(params.spacing * 2.0)))
        }
        FillPattern::Lines => Fill::from_lines(generator.lines(region, params)),
        FillPattern::Triangles => Fill::from_lines(generator.triangles(
            region,
            &params.with_spacing(params.spacing * 3.0).with_angle(0.0),
        )),
        FillPattern::Concentric => Fill::from_polygons(generator.concentric(region, params)),
        FillPattern::ZigZag => Fill::from_lines(generator.zigzag(region, params, false)),
        FillPattern::Unknown(name) => {
            let err = SlicerError::UnknownFillPattern(name.clone());
            error!(error = %err, "skipping infill region");
            Fill::default()
        }
    }
}

/// Whether a sparse pattern gets a wipe move after each line.
pub fn uses_infill_wipe(pattern: &FillPattern) -> bool {
    matches!(
        pattern,
        FillPattern::Grid | FillPattern::Lines | FillPattern::Triangles
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(size: f64) -> Polygon {
        Polygon::rect(Point2::origin(), Point2::new(size, size))
    }

    #[test]
    fn test_pattern_names() {
        assert_eq!("grid".parse::<FillPattern>(), Ok(FillPattern::Grid));
        assert_eq!("ZigZag".parse::<FillPattern>(), Ok(FillPattern::ZigZag));
        assert_eq!("zig_zag".parse::<FillPattern>(), Ok(FillPattern::ZigZag));
        assert_eq!(
            "honeycomb".parse::<FillPattern>(),
            Err(SlicerError::UnknownFillPattern("honeycomb".into()))
        );
        for pattern in FillPattern::ALL {
            assert_eq!(pattern.to_string().parse::<FillPattern>(), Ok(pattern));
        }
    }

    #[test]
    fn test_unknown_pattern_name_loads() {
        let pattern: FillPattern = serde_json::from_str(r#""honeycomb""#).unwrap();
        assert_eq!(pattern, FillPattern::Unknown("honeycomb".into()));
        assert_eq!(serde_json::to_string(&pattern).unwrap(), r#""honeycomb""#);

        let known: FillPattern = serde_json::from_str(r#""zig_zag""#).unwrap();
        assert_eq!(known, FillPattern::ZigZag);
    }

    #[test]
    fn test_unknown_pattern_fills_nothing() {
        let fill = sparse_infill(
            &ScanlineFill,
            &FillPattern::Unknown("honeycomb".into()),
            &[square(10.0)],
            &FillParams::new(0.4, 2.0, 45.0),
        );
        assert!(fill.is_empty());
    }

    #[test]
    fn test_sparse_concentric_starts_on_outline() {
        let fill = sparse_infill(
            &ScanlineFill,
            &FillPattern::Concentric,
            &[square(10.0)],
            &FillParams::new(0.4, 2.0, 0.0),
        );
        assert_eq!(fill.polygons.len(), 3);
        assert_relative_eq!(fill.polygons[0].signed_area(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sparse_zigzag_is_unconnected() {
        let fill = sparse_infill(
            &ScanlineFill,
            &FillPattern::ZigZag,
            &[square(10.0)],
            &FillParams::new(0.4, 2.0, 0.0),
        );
        assert_eq!(fill.lines.len(), 5);
    }

    #[test]
    fn test_lines_pitch() {
        let lines = ScanlineFill.lines(&[square(16.0)], &FillParams::new(0.4, 4.0, 0.0));
        assert_eq!(lines.len(), 4);
        for (i, line) in lines.iter().enumerate() {
            assert_relative_eq!(line.points[0].y, 2.0 + 4.0 * i as f64, epsilon = 1e-9);
            assert_relative_eq!(line.length(), 16.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_lines_follow_angle() {
        let lines = ScanlineFill.lines(&[square(16.0)], &FillParams::new(0.4, 4.0, 45.0));
        assert!(!lines.is_empty());
        for line in &lines {
            let d = line.points[1] - line.points[0];
            assert_relative_eq!(d.y.abs(), d.x.abs(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_infill_with_hole() {
        let outer = square(20.0);
        // CW hole in center
        let hole = Polygon::new(vec![
            Point2::new(8.0, 8.0),
            Point2::new(8.0, 12.0),
            Point2::new(12.0, 12.0),
            Point2::new(12.0, 8.0),
        ]);

        let lines = ScanlineFill.lines(&[outer, hole], &FillParams::new(0.45, 1.0, 0.0));
        assert!(!lines.is_empty());

        // No segment crosses the hole
        for line in &lines {
            let mid = Point2::from((line.points[0].coords + line.points[1].coords) / 2.0);
            assert!(!(mid.x > 8.5 && mid.x < 11.5 && mid.y > 8.5 && mid.y < 11.5));
        }
    }

    #[test]
    fn test_zero_area_region_is_empty() {
        let degenerate = Polygon::new(vec![
            Point2::new(0.0, 0.0),
            Point2::new(5.0, 0.0),
            Point2::new(10.0, 0.0),
        ]);
        for pattern in FillPattern::ALL {
            let fill = sparse_infill(
                &ScanlineFill,
                &pattern,
                &[degenerate.clone()],
                &FillParams::new(0.4, 2.0, 45.0),
            );
            assert!(fill.is_empty(), "{pattern} produced output");
        }
    }

    #[test]
    fn test_grid_spreads_line_sets() {
        let params = FillParams::new(0.4, 2.0, 0.0);
        let fill = sparse_infill(&ScanlineFill, &FillPattern::Grid, &[square(16.0)], &params);
        // Two directions, each at 4mm pitch over 16mm
        assert_eq!(fill.lines.len(), 8);
    }

    #[test]
    fn test_concentric_rings() {
        let rings = ScanlineFill.concentric(&[square(10.0)], &FillParams::new(0.4, 2.0, 0.0));
        // 10, 6 and 2 mm squares
        assert_eq!(rings.len(), 3);
        assert_relative_eq!(rings[2].signed_area(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zigzag_connects_runs() {
        let params = FillParams::new(0.4, 2.0, 0.0);
        let connected = ScanlineFill.zigzag(&[square(10.0)], &params, true);
        assert_eq!(connected.len(), 1);
        assert_eq!(connected[0].len(), 10);

        let loose = ScanlineFill.zigzag(&[square(10.0)], &params, false);
        assert_eq!(loose.len(), 5);
        // Alternating direction
        assert!(loose[0].points[0].x < loose[0].points[1].x);
        assert!(loose[1].points[0].x > loose[1].points[1].x);
    }

    #[test]
    fn test_combine_spacing() {
        assert_relative_eq!(combine_spacing(2.0, 0), 2.0);
        assert_relative_eq!(combine_spacing(2.0, 1), 4.0);
        assert_relative_eq!(combine_spacing(2.0, 3), 8.0);
    }
}
