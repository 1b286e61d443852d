//! Wipe tower printed after every tool change.

use tracing::{trace, warn};

use crate::config::{Feature, PathConfig};
use crate::model::Model;
use crate::path::{offset_region, Point2, Polygon};
use crate::perimeter::add_polygons_ordered;
use crate::planner::LayerPlan;
use crate::settings::Settings;

/// Wipe tower geometry and placement for one job.
#[derive(Debug, Clone)]
pub struct WipeTower {
    footprint: Vec<Polygon>,
    wipe_point: Point2,
    ring_spacing: f64,
    outward: bool,
    cutoff: Option<usize>,
}

impl WipeTower {
    /// Tower for `model`, or `None` when the job prints no tower.
    pub fn new(model: &Model, settings: &Settings) -> Option<Self> {
        if settings.wipe_tower_size <= 0.0 {
            return None;
        }
        if model.wipe_tower.is_empty() {
            warn!(
                size = settings.wipe_tower_size,
                "wipe tower enabled but its footprint is empty"
            );
            return None;
        }
        Some(Self {
            footprint: model.wipe_tower.clone(),
            wipe_point: model.wipe_point,
            ring_spacing: settings.wall_line_width_x,
            outward: settings.wipe_tower_dir_outward,
            cutoff: model.wipe_tower_cutoff(),
        })
    }

    /// Whether the tower is still printed on `layer_nr`.
    pub fn is_active(&self, layer_nr: usize) -> bool {
        self.cutoff.is_none_or(|cutoff| layer_nr <= cutoff + 1)
    }

    /// Concentric rings for a layer, outermost first.
    ///
    /// Odd layers start half a ring inward so the seams of consecutive
    /// layers do not line up.
    pub fn rings(&self, layer_nr: usize) -> Vec<Vec<Polygon>> {
        let mut step = self.ring_spacing;
        if layer_nr > 0 {
            step *= 2.0;
        }
        if step <= 0.0 {
            return Vec::new();
        }

        let first = if layer_nr % 2 == 1 {
            offset_region(&self.footprint, step / 2.0)
        } else {
            self.footprint.clone()
        };
        let mut rings = Vec::new();
        let mut current = first;
        while !current.is_empty() {
            let next = offset_region(&current, step);
            rings.push(current);
            current = next;
        }
        rings
    }

    /// Print the tower after a switch from `prev_extruder` to the plan's
    /// current extruder, then travel to the wipe point.
    ///
    /// `config` is the inner wall config of the first mesh. Returns false
    /// when the tower is past its cutoff layer.
    pub fn emit(
        &self,
        plan: &mut LayerPlan,
        layer_nr: usize,
        config: &PathConfig,
        settings: &Settings,
        prev_extruder: usize,
    ) -> bool {
        if !self.is_active(layer_nr) {
            return false;
        }
        let config = PathConfig {
            feature: Feature::WipeTower,
            ..*config
        };

        let mut rings = self.rings(layer_nr);
        if self.outward {
            rings.reverse();
        }
        trace!(layer = layer_nr, rings = rings.len(), "wipe tower");
        for ring in &rings {
            add_polygons_ordered(plan, ring, &config, None);
        }

        let prev_offset = settings.extruder_offset(prev_extruder);
        let new_offset = settings.extruder_offset(plan.extruder());
        plan.add_travel(self.wipe_point - prev_offset.coords + new_offset.coords);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CoastingConfig, MeshConfigs, TravelConfig};
    use crate::planner::SegmentKind;
    use crate::settings::{MeshProfile, MeshSettings};
    use crate::stream::EventLog;
    use approx::assert_relative_eq;

    fn model() -> Model {
        Model {
            wipe_tower: vec![Polygon::rect(
                Point2::new(100.0, 100.0),
                Point2::new(104.0, 104.0),
            )],
            wipe_point: Point2::new(102.0, 110.0),
            wipe_tower_cutoff_layer: Some(3),
            ..Default::default()
        }
    }

    fn settings() -> Settings {
        Settings {
            wipe_tower_size: 4.0,
            wall_line_width_x: 0.5,
            machine_extruder_offsets: vec![Point2::origin(), Point2::new(18.0, 0.0)],
            ..Default::default()
        }
    }

    fn width(ring: &[Polygon]) -> f64 {
        ring.first()
            .and_then(Polygon::bounds)
            .map_or(0.0, |(min, max)| max.x - min.x)
    }

    #[test]
    fn test_disabled_without_size_or_footprint() {
        let no_size = Settings {
            wipe_tower_size: 0.0,
            ..settings()
        };
        assert!(WipeTower::new(&model(), &no_size).is_none());
        assert!(WipeTower::new(&Model::default(), &settings()).is_none());
    }

    #[test]
    fn test_rings_step_inward() {
        let tower = WipeTower::new(&model(), &settings()).map(|t| t.rings(0));
        let rings = tower.unwrap_or_default();
        // 4mm footprint in 0.5mm steps, inset on both sides
        let widths: Vec<f64> = rings.iter().map(|r| width(r)).collect();
        assert_eq!(widths.len(), 4);
        assert_relative_eq!(widths[0], 4.0, epsilon = 1e-9);
        assert_relative_eq!(widths[1], 3.0, epsilon = 1e-9);
        assert_relative_eq!(widths[3], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_odd_layers_start_half_a_ring_in() {
        let tower = WipeTower::new(&model(), &settings()).map(|t| t.rings(1));
        let rings = tower.unwrap_or_default();
        // Layer spacing doubles above layer 0: 4 -> 3 (half step) -> 1
        let widths: Vec<f64> = rings.iter().map(|r| width(r)).collect();
        assert_eq!(widths.len(), 2);
        assert_relative_eq!(widths[0], 3.0, epsilon = 1e-9);
        assert_relative_eq!(widths[1], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cutoff() {
        let Some(tower) = WipeTower::new(&model(), &settings()) else {
            panic!("tower expected");
        };
        assert!(tower.is_active(4));
        assert!(!tower.is_active(5));
    }

    #[test]
    fn test_emit_ends_at_offset_wipe_point() {
        let settings = settings();
        let Some(tower) = WipeTower::new(&model(), &settings) else {
            panic!("tower expected");
        };
        let profile = MeshProfile::resolve(&MeshSettings::default(), &settings);
        let configs = MeshConfigs::resolve(&profile, 0.1);
        let mut plan = LayerPlan::new(
            2,
            0.3,
            0.1,
            &EventLog::new(),
            &TravelConfig::from_settings(&settings),
            &CoastingConfig::default(),
        );
        plan.set_extruder(1);
        assert!(tower.emit(&mut plan, 2, &configs.inset_x, &settings, 0));

        assert!(plan
            .segments()
            .iter()
            .filter(|s| s.kind == SegmentKind::Extrusion)
            .all(|s| s.config.feature == Feature::WipeTower));
        assert_eq!(plan.last_position(), Point2::new(120.0, 110.0));

        assert!(!tower.emit(&mut plan, 9, &configs.inset_x, &settings, 0));
    }
}
