//! Top/bottom skin emission and bridge detection.

use tracing::error;

use crate::config::PathConfig;
use crate::error::SlicerError;
use crate::infill::{FillGenerator, FillParams, FillPattern};
use crate::model::{Layer, Part};
use crate::order::order_polylines;
use crate::path::{bounds, offset_region, point_in_polygon, point_in_region, Polygon, Polyline};
use crate::perimeter::add_polygons_ordered;
use crate::planner::LayerPlan;
use crate::settings::{GapFill, Settings};

/// Finds the direction to bridge a region that has nothing below it.
pub trait BridgeDetector {
    /// Bridging direction in `[0°, 180°)`, or `None` when the region does
    /// not bridge.
    fn bridge_angle(&self, region: &[Polygon], prior_layer: &Layer) -> Option<f64>;
}

/// Bridges between exactly two islands of the layer below.
///
/// Lines run along the direction from one supporting island's centre to the
/// other's, so both ends of every line rest on material.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverhangBridge;

impl BridgeDetector for OverhangBridge {
    fn bridge_angle(&self, region: &[Polygon], prior_layer: &Layer) -> Option<f64> {
        let supports: Vec<&Polygon> = prior_layer
            .parts
            .iter()
            .filter_map(|part| part.outline.first())
            .filter(|island| touches(region, island))
            .collect();
        let [a, b] = supports.as_slice() else {
            return None;
        };
        let d = b.centroid() - a.centroid();
        if d.norm() < 1e-9 {
            return None;
        }
        Some(d.y.atan2(d.x).to_degrees().rem_euclid(180.0))
    }
}

fn touches(region: &[Polygon], island: &Polygon) -> bool {
    let (Some((rmin, rmax)), Some((imin, imax))) = (bounds(region), island.bounds()) else {
        return false;
    };
    if rmax.x < imin.x || imax.x < rmin.x || rmax.y < imin.y || imax.y < rmin.y {
        return false;
    }
    island.points.iter().any(|p| point_in_region(p, region))
        || region
            .iter()
            .filter(|p| p.is_ccw())
            .flat_map(|p| p.points.iter())
            .any(|p| point_in_polygon(p, island))
}

/// Skin parameters shared by every part of a mesh.
pub struct SkinFill<'a> {
    /// Line generator.
    pub fill: &'a dyn FillGenerator,
    /// Bridge detector.
    pub bridge: &'a dyn BridgeDetector,
    /// Top/bottom pattern.
    pub pattern: FillPattern,
    /// Extra -45° on every second pair of layers.
    pub alternate_rotation: bool,
    /// Gap filling.
    pub gap_fill: GapFill,
    /// Overlap into walls (%).
    pub overlap: f64,
}

impl<'a> SkinFill<'a> {
    /// Skin parameters from job settings.
    pub fn new(
        settings: &Settings,
        fill: &'a dyn FillGenerator,
        bridge: &'a dyn BridgeDetector,
        overlap: f64,
    ) -> Self {
        Self {
            fill,
            bridge,
            pattern: settings.top_bottom_pattern.clone(),
            alternate_rotation: settings.skin_alternate_rotation
                && (settings.top_layers >= 4 || settings.bottom_layers >= 4),
            gap_fill: settings.fill_perimeter_gaps,
            overlap,
        }
    }

    /// Raster angle for skin on a layer whose sparse fill uses `fill_angle`.
    pub fn skin_angle(&self, fill_angle: f64, layer_nr: usize) -> f64 {
        if self.alternate_rotation && (layer_nr / 2) % 2 == 1 {
            fill_angle - 45.0
        } else {
            fill_angle
        }
    }
}

/// Print the skin regions and perimeter gaps of a part.
///
/// A region with a bridge below is filled along the bridge direction, as
/// reported, instead of the configured pattern. Gaps are filled with plain
/// lines at the skin angle and no overlap: those of a skin region only when
/// it was filled as lines inside its insets, those of the part always.
pub fn emit_skin(
    plan: &mut LayerPlan,
    part: &Part,
    config: &PathConfig,
    skin: &SkinFill<'_>,
    prior_layer: Option<&Layer>,
    layer_nr: usize,
    fill_angle: f64,
) {
    let width = config.line_width;
    let skin_angle = skin.skin_angle(fill_angle, layer_nr);
    let params = FillParams::new(width, width, skin_angle).with_overlap(skin.overlap);
    let gaps = FillParams::new(width, width, skin_angle);
    let fill_gaps = skin.gap_fill != GapFill::Nowhere;
    let mut rings: Vec<Polygon> = Vec::new();
    let mut lines: Vec<Polyline> = Vec::new();

    for skin_part in &part.skin_parts {
        let bridge = prior_layer.and_then(|prior| skin.bridge.bridge_angle(&skin_part.outline, prior));

        if let Some(angle) = bridge {
            lines.extend(skin.fill.lines(&skin_part.outline, &params.with_angle(angle)));
            continue;
        }
        match &skin.pattern {
            FillPattern::Lines => match skin_part.insets.last() {
                Some(innermost) => {
                    for inset in &skin_part.insets {
                        add_polygons_ordered(plan, inset, config, None);
                    }
                    let region = offset_region(innermost, width / 2.0);
                    lines.extend(skin.fill.lines(&region, &params));
                    if fill_gaps {
                        lines.extend(skin.fill.lines(&skin_part.perimeter_gaps, &gaps));
                    }
                }
                None => lines.extend(skin.fill.lines(&skin_part.outline, &params)),
            },
            FillPattern::Concentric => {
                let start = offset_region(&skin_part.outline, width / 2.0);
                rings.extend(skin.fill.concentric(&start, &params));
            }
            FillPattern::Unknown(name) => {
                let err = SlicerError::UnknownFillPattern(name.clone());
                error!(layer = layer_nr, error = %err, "skipping skin region");
            }
            pattern @ (FillPattern::Grid | FillPattern::Triangles | FillPattern::ZigZag) => {
                let err = SlicerError::UnsupportedPattern {
                    feature: "skin",
                    pattern: pattern.clone(),
                };
                error!(layer = layer_nr, error = %err, "skipping skin region");
            }
        }
    }

    if fill_gaps {
        lines.extend(skin.fill.lines(&part.perimeter_gaps, &gaps));
    }

    add_polygons_ordered(plan, &rings, config, None);
    let ordered = order_polylines(plan.last_position(), &lines);
    plan.add_open_path(&ordered, config, None);
}
