//! Wall emission.

use tracing::warn;

use crate::config::{MeshConfigs, PathConfig};
use crate::model::{Layer, Part};
use crate::order::{order_polygons, order_polylines};
use crate::overlap::OverlapFlow;
use crate::path::Polygon;
use crate::planner::LayerPlan;

/// Area below which a loop is treated as flat (mm²).
const ZERO_AREA: f64 = 1e-9;

/// How the outer wall is printed on this layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallMode {
    /// Closed loops.
    Normal,
    /// First spiralized layer: also prints the fixed inner walls once.
    SpiralStart,
    /// Continuous helical outer wall.
    Spiral,
}

impl WallMode {
    /// Wall mode for a layer of a mesh with `spiralize` on or off.
    pub fn for_layer(spiralize: bool, layer_nr: usize, bottom_layers: usize) -> Self {
        if !spiralize || layer_nr < bottom_layers {
            WallMode::Normal
        } else if layer_nr == bottom_layers {
            WallMode::SpiralStart
        } else {
            WallMode::Spiral
        }
    }

    /// Whether the outer wall ramps Z.
    pub fn spiralizes(self) -> bool {
        self != WallMode::Normal
    }
}

/// Add closed paths in greedy order from the plan's current position.
///
/// Loops of three or more vertices that enclose no area are dropped.
/// Two-point paths are edges and always printed.
pub fn add_polygons_ordered(
    plan: &mut LayerPlan,
    polygons: &[Polygon],
    config: &PathConfig,
    overlap: Option<&dyn OverlapFlow>,
) {
    let printable: Vec<Polygon> = polygons
        .iter()
        .filter(|p| p.len() < 3 || p.signed_area().abs() > ZERO_AREA)
        .cloned()
        .collect();
    let ordered = order_polygons(plan.last_position(), &printable);
    plan.add_closed_path(&ordered, config, overlap);
}

/// Print a part's walls, innermost first so the outer wall goes down last.
///
/// `overlap` reduces the outer wall's flow where it overlaps itself.
pub fn emit_walls(
    plan: &mut LayerPlan,
    part: &Part,
    configs: &MeshConfigs,
    mode: WallMode,
    overlap: Option<&dyn OverlapFlow>,
) {
    if part.insets.is_empty() {
        if !part.outline.is_empty() {
            warn!(layer = plan.layer_nr(), "part has no walls");
        }
        return;
    }

    if mode == WallMode::SpiralStart {
        add_polygons_ordered(plan, &part.insets[0], &configs.inset_x, None);
    }

    let mut inset0 = configs.inset0;
    inset0.spiralize = mode.spiralizes();

    for (inset_nr, inset) in part.insets.iter().enumerate().rev() {
        if inset_nr == 0 {
            add_polygons_ordered(plan, inset, &inset0, overlap);
        } else {
            add_polygons_ordered(plan, inset, &configs.inset_x, None);
        }
    }
}

/// Print a layer as a bare surface: every outline edge as its own
/// two-point path, plus the layer's open polylines.
pub fn emit_surface(plan: &mut LayerPlan, layer: &Layer, configs: &MeshConfigs, mode: WallMode) {
    let mut config = configs.inset0;
    config.spiralize = mode.spiralizes();

    let mut edges = Vec::new();
    for part in &layer.parts {
        for polygon in &part.outline {
            let n = polygon.points.len();
            if n < 2 {
                continue;
            }
            for i in 0..n {
                edges.push(Polygon::new(vec![
                    polygon.points[i],
                    polygon.points[(i + 1) % n],
                ]));
            }
        }
    }
    add_polygons_ordered(plan, &edges, &config, None);

    let lines = order_polylines(plan.last_position(), &layer.open_lines);
    plan.add_open_path(&lines, &config, None);
}
