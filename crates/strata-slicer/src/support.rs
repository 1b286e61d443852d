//! Support line and roof emission.
//!
//! Support areas come precomputed per layer. This module only decides how
//! each island is filled and in which order islands are visited.

use tracing::error;

use crate::config::PathConfig;
use crate::error::SlicerError;
use crate::infill::{FillGenerator, FillParams, FillPattern};
use crate::order::{order_polylines, PathOrderOptimizer};
use crate::path::{split_into_parts, Polygon, Polyline};
use crate::perimeter::add_polygons_ordered;
use crate::planner::LayerPlan;
use crate::settings::Settings;

/// Overlap used for the dense first-layer support grid (%).
const FIRST_LAYER_OVERLAP: f64 = 150.0;

/// Lines filling one support island, and whether its outline is printed too.
fn island_fill(
    fill: &dyn FillGenerator,
    island: &[Polygon],
    settings: &Settings,
    width: f64,
    layer_nr: usize,
) -> (Vec<Polyline>, bool) {
    let spacing = settings.support_line_distance;
    let pattern = &settings.support_pattern;
    let outline = match pattern {
        FillPattern::Grid => true,
        FillPattern::ZigZag => layer_nr == 0,
        _ => false,
    };
    if spacing <= 0.0 {
        return (Vec::new(), outline);
    }

    if layer_nr == 0 {
        let params = FillParams::new(width, spacing, 0.0).with_overlap(FIRST_LAYER_OVERLAP);
        return (fill.grid(island, &params), outline);
    }

    let params = FillParams::new(width, spacing, 0.0);
    let lines = match pattern {
        FillPattern::Grid => {
            let params = params.with_overlap(settings.fill_overlap);
            if spacing > width * 4.0 {
                fill.grid(island, &params.with_spacing(spacing * 2.0))
            } else {
                let angle = if layer_nr % 2 == 1 { 0.0 } else { 90.0 };
                fill.lines(island, &params.with_angle(angle))
            }
        }
        FillPattern::Lines => fill.lines(island, &params),
        FillPattern::ZigZag => fill.zigzag(island, &params, settings.support_connect_zigzags),
        FillPattern::Unknown(name) => {
            let err = SlicerError::UnknownFillPattern(name.clone());
            error!(layer = layer_nr, error = %err, "skipping support island");
            Vec::new()
        }
        pattern @ (FillPattern::Triangles | FillPattern::Concentric) => {
            let err = SlicerError::UnsupportedPattern {
                feature: "support",
                pattern: pattern.clone(),
            };
            error!(layer = layer_nr, error = %err, "skipping support island");
            Vec::new()
        }
    };
    (lines, outline)
}

/// Print the support areas of a layer, island by island.
///
/// Islands are visited greedily from the plan's current position. The
/// first layer always gets a dense grid for adhesion, whatever the
/// configured pattern.
pub fn emit_support_lines(
    plan: &mut LayerPlan,
    support_areas: &[Polygon],
    config: &PathConfig,
    settings: &Settings,
    layer_nr: usize,
    fill: &dyn FillGenerator,
) {
    let islands: Vec<Vec<Polygon>> = split_into_parts(support_areas)
        .into_iter()
        .filter(|island| !island.is_empty())
        .collect();

    let mut optimizer = PathOrderOptimizer::new(plan.last_position());
    for island in &islands {
        if let Some(outer) = island.first() {
            optimizer.add_polygon(outer);
        }
    }

    for idx in optimizer.optimize() {
        let island = &islands[idx];
        let (lines, outline) = island_fill(fill, island, settings, config.line_width, layer_nr);
        if outline {
            add_polygons_ordered(plan, island, config, None);
        }
        let ordered = order_polylines(plan.last_position(), &lines);
        plan.add_open_path(&ordered, config, None);
    }
}

/// Raster angle for support roofs.
///
/// Thin roofs run perpendicular to the support lines; thicker ones alternate
/// between the two diagonals.
pub fn roof_angle(settings: &Settings, layer_nr: usize) -> f64 {
    if settings.support_roof_height < 2.0 * settings.layer_height {
        90.0
    } else {
        45.0 + 90.0 * (layer_nr % 2) as f64
    }
}

/// Print support roofs as dense lines.
pub fn emit_support_roofs(
    plan: &mut LayerPlan,
    roofs: &[Polygon],
    config: &PathConfig,
    settings: &Settings,
    layer_nr: usize,
    fill: &dyn FillGenerator,
) {
    let width = config.line_width;
    let params = FillParams::new(width, width, roof_angle(settings, layer_nr));
    let lines = fill.lines(roofs, &params);
    let ordered = order_polylines(plan.last_position(), &lines);
    plan.add_open_path(&ordered, config, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CoastingConfig, Feature, LayerConfigs, TravelConfig};
    use crate::infill::ScanlineFill;
    use crate::path::Point2;
    use crate::planner::SegmentKind;
    use crate::stream::EventLog;
    use approx::assert_relative_eq;

    fn plan(settings: &Settings) -> LayerPlan {
        LayerPlan::new(
            1,
            0.3,
            0.1,
            &EventLog::new(),
            &TravelConfig::from_settings(settings),
            &CoastingConfig::default(),
        )
    }

    fn support_config(settings: &Settings) -> PathConfig {
        LayerConfigs::resolve(settings, &[], 5, 0.1).support
    }

    fn square(min: f64, max: f64) -> Polygon {
        Polygon::rect(Point2::new(min, min), Point2::new(max, max))
    }

    fn closed_loops(plan: &LayerPlan) -> usize {
        // Closed loops end on their first vertex; count extrusion segments of
        // more than two points.
        plan.segments()
            .iter()
            .filter(|s| s.kind == SegmentKind::Extrusion && s.points.len() > 2)
            .count()
    }

    #[test]
    fn test_islands_visited_nearest_first() {
        let settings = Settings {
            support_pattern: FillPattern::Lines,
            ..Default::default()
        };
        let mut plan = plan(&settings);
        let far = square(50.0, 60.0);
        let near = square(5.0, 15.0);
        emit_support_lines(
            &mut plan,
            &[far, near],
            &support_config(&settings),
            &settings,
            3,
            &ScanlineFill,
        );

        let first = plan
            .segments()
            .iter()
            .find(|s| s.kind == SegmentKind::Extrusion)
            .and_then(|s| s.points.first().copied());
        assert!(first.is_some_and(|p| p.x < 20.0));
        assert!(plan
            .segments()
            .iter()
            .any(|s| s.kind == SegmentKind::Extrusion && s.points.iter().any(|p| p.x > 40.0)));
    }

    #[test]
    fn test_lines_above_first_layer_have_no_outline() {
        let settings = Settings {
            support_pattern: FillPattern::Lines,
            ..Default::default()
        };
        let mut plan = plan(&settings);
        emit_support_lines(
            &mut plan,
            &[square(0.0, 10.0)],
            &support_config(&settings),
            &settings,
            3,
            &ScanlineFill,
        );
        assert!(!plan.is_empty());
        assert_eq!(closed_loops(&plan), 0);
        assert!(plan
            .segments()
            .iter()
            .all(|s| s.config.feature == Feature::Support || s.kind == SegmentKind::Travel));
    }

    #[test]
    fn test_grid_prints_island_outline() {
        let settings = Settings {
            support_pattern: FillPattern::Grid,
            ..Default::default()
        };
        let mut plan = plan(&settings);
        emit_support_lines(
            &mut plan,
            &[square(0.0, 10.0)],
            &support_config(&settings),
            &settings,
            3,
            &ScanlineFill,
        );
        let first_extrusion = plan
            .segments()
            .iter()
            .find(|s| s.kind == SegmentKind::Extrusion);
        assert_eq!(first_extrusion.map(|s| s.points.len()), Some(4));
    }

    #[test]
    fn test_unsupported_pattern_is_skipped() {
        let settings = Settings {
            support_pattern: FillPattern::Concentric,
            ..Default::default()
        };
        let mut plan = plan(&settings);
        emit_support_lines(
            &mut plan,
            &[square(0.0, 10.0)],
            &support_config(&settings),
            &settings,
            3,
            &ScanlineFill,
        );
        assert!(plan.is_empty());

        // The first layer grid replaces every pattern
        let mut plan = self::plan(&settings);
        emit_support_lines(
            &mut plan,
            &[square(0.0, 10.0)],
            &support_config(&settings),
            &settings,
            0,
            &ScanlineFill,
        );
        assert!(!plan.is_empty());
    }

    #[test]
    fn test_zero_spacing_prints_no_lines() {
        let settings = Settings {
            support_pattern: FillPattern::Lines,
            support_line_distance: 0.0,
            ..Default::default()
        };
        let mut plan = plan(&settings);
        emit_support_lines(
            &mut plan,
            &[square(0.0, 10.0)],
            &support_config(&settings),
            &settings,
            3,
            &ScanlineFill,
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_roof_angle() {
        let thin = Settings {
            layer_height: 0.1,
            support_roof_height: 0.15,
            ..Default::default()
        };
        assert_relative_eq!(roof_angle(&thin, 3), 90.0);

        let thick = Settings {
            layer_height: 0.1,
            support_roof_height: 1.0,
            ..Default::default()
        };
        assert_relative_eq!(roof_angle(&thick, 2), 45.0);
        assert_relative_eq!(roof_angle(&thick, 3), 135.0);
    }

    #[test]
    fn test_roofs_use_roof_config() {
        let settings = Settings::default();
        let configs = LayerConfigs::resolve(&settings, &[], 5, 0.1);
        let mut plan = plan(&settings);
        emit_support_roofs(
            &mut plan,
            &[square(0.0, 5.0)],
            &configs.support_roof,
            &settings,
            5,
            &ScanlineFill,
        );
        assert!(plan
            .segments()
            .iter()
            .any(|s| s.kind == SegmentKind::Extrusion
                && s.config.feature == Feature::SupportRoof));
    }
}
