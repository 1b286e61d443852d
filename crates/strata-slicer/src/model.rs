//! Sliced model handed over by the upstream slicer.
//!
//! All geometry is read-only during planning. Every mesh carries one
//! [`Layer`] per layer index; a layer without parts is simply empty.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SlicerError};
use crate::path::{bounds, Point2, Polygon, Polyline};
use crate::settings::MeshSettings;

/// Solid top/bottom region inside a part.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkinPart {
    /// Region outline, outer contours and holes.
    pub outline: Vec<Polygon>,
    /// Nested inset rings of the region, outermost first.
    pub insets: Vec<Vec<Polygon>>,
    /// Gaps left between the skin insets.
    pub perimeter_gaps: Vec<Polygon>,
}

/// One island of a layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Part {
    /// Outline, outer contour first, then holes.
    pub outline: Vec<Polygon>,
    /// Wall rings, index 0 is the outer wall.
    pub insets: Vec<Vec<Polygon>>,
    /// Solid skin regions.
    pub skin_parts: Vec<SkinPart>,
    /// Sparse infill regions, indexed by combine level.
    pub sparse_outline: Vec<Vec<Polygon>>,
    /// Gaps left between walls.
    pub perimeter_gaps: Vec<Polygon>,
}

impl Part {
    /// First outer contour vertex, used to order parts.
    pub fn start_point(&self) -> Option<Point2> {
        self.outline.first().and_then(|p| p.points.first().copied())
    }
}

/// One Z slab of a mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Layer {
    /// Top of the slab (mm).
    pub print_z: f64,
    /// Disjoint islands.
    pub parts: Vec<Part>,
    /// Open polylines (surface mode only).
    pub open_lines: Vec<Polyline>,
}

impl Layer {
    /// Check if the layer has nothing to print.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty() && self.open_lines.is_empty()
    }
}

/// One object printed with one extruder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Mesh {
    /// Per-mesh setting overrides.
    pub settings: MeshSettings,
    /// One entry per layer index.
    pub layers: Vec<Layer>,
}

impl Mesh {
    /// Highest layer index with geometry.
    pub fn max_filled_layer(&self) -> Option<usize> {
        self.layers.iter().rposition(|layer| !layer.is_empty())
    }
}

/// Support geometry of one layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportLayer {
    /// Areas filled with support lines.
    pub support_areas: Vec<Polygon>,
    /// Areas filled with dense roofs.
    pub roofs: Vec<Polygon>,
}

impl SupportLayer {
    /// Check if the layer has no support.
    pub fn is_empty(&self) -> bool {
        self.support_areas.is_empty() && self.roofs.is_empty()
    }
}

/// Support geometry of the whole model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportStorage {
    /// Support was generated for this model.
    pub generated: bool,
    /// One entry per layer index; missing entries have no support.
    pub layers: Vec<SupportLayer>,
}

impl SupportStorage {
    /// Support at a layer, if any.
    pub fn layer(&self, layer_nr: usize) -> Option<&SupportLayer> {
        if !self.generated {
            return None;
        }
        self.layers.get(layer_nr).filter(|layer| !layer.is_empty())
    }

    /// Highest layer index with support.
    pub fn max_filled_layer(&self) -> Option<usize> {
        self.layers.iter().rposition(|layer| !layer.is_empty())
    }
}

/// Everything the planner needs for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Model {
    /// Meshes, all with the same layer count.
    pub meshes: Vec<Mesh>,
    /// Support areas and roofs.
    pub support: SupportStorage,
    /// Skirt or brim loops printed on layer 0.
    pub skirt: Vec<Polygon>,
    /// Ooze shield per layer.
    pub ooze_shield: Vec<Vec<Polygon>>,
    /// Draft shield outline.
    pub draft_shield: Vec<Polygon>,
    /// Raft outline.
    pub raft_outline: Vec<Polygon>,
    /// Wipe tower footprint.
    pub wipe_tower: Vec<Polygon>,
    /// Point the nozzle wipes on after a tool change.
    pub wipe_point: Point2,
    /// Last layer that still gets a wipe tower is this plus one. Derived
    /// from the extruders' last filled layers when unset.
    pub wipe_tower_cutoff_layer: Option<usize>,
}

impl Default for Model {
    fn default() -> Self {
        Self {
            meshes: Vec::new(),
            support: SupportStorage::default(),
            skirt: Vec::new(),
            ooze_shield: Vec::new(),
            draft_shield: Vec::new(),
            raft_outline: Vec::new(),
            wipe_tower: Vec::new(),
            wipe_point: Point2::origin(),
            wipe_tower_cutoff_layer: None,
        }
    }
}

impl Model {
    /// Check the model can be planned.
    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.meshes.first() else {
            return Err(SlicerError::EmptyModel);
        };
        let expected = first.layers.len();
        if expected == 0 {
            return Err(SlicerError::EmptyModel);
        }
        for (mesh, m) in self.meshes.iter().enumerate().skip(1) {
            if m.layers.len() != expected {
                return Err(SlicerError::LayerCountMismatch {
                    mesh,
                    expected,
                    found: m.layers.len(),
                });
            }
        }
        Ok(())
    }

    /// Number of layers (taken from mesh 0).
    pub fn layer_count(&self) -> usize {
        self.meshes.first().map_or(0, |mesh| mesh.layers.len())
    }

    /// Print Z of a layer (mesh 0).
    pub fn print_z(&self, layer_nr: usize) -> f64 {
        self.meshes
            .first()
            .and_then(|mesh| mesh.layers.get(layer_nr))
            .map_or(0.0, |layer| layer.print_z)
    }

    /// Minimum XY corner of all part outlines.
    pub fn min_xy(&self) -> Option<Point2> {
        let outlines: Vec<Polygon> = self
            .meshes
            .iter()
            .flat_map(|mesh| mesh.layers.iter())
            .flat_map(|layer| layer.parts.iter())
            .flat_map(|part| part.outline.iter().cloned())
            .collect();
        bounds(&outlines).map(|(min, _)| min)
    }

    /// Last layer index after which the wipe tower is no longer printed.
    ///
    /// Unless set explicitly, this is the last filled layer of the extruder
    /// that finishes second to last.
    pub fn wipe_tower_cutoff(&self) -> Option<usize> {
        if self.wipe_tower_cutoff_layer.is_some() {
            return self.wipe_tower_cutoff_layer;
        }
        let mut per_extruder: Vec<(usize, usize)> = Vec::new();
        for mesh in &self.meshes {
            let Some(max) = mesh.max_filled_layer() else {
                continue;
            };
            let extruder = mesh.settings.extruder_nr;
            match per_extruder.iter_mut().find(|(e, _)| *e == extruder) {
                Some((_, last)) => *last = (*last).max(max),
                None => per_extruder.push((extruder, max)),
            }
        }
        let mut last_layers: Vec<usize> = per_extruder.into_iter().map(|(_, l)| l).collect();
        last_layers.sort_unstable_by(|a, b| b.cmp(a));
        last_layers.get(1).copied()
    }

    /// Extruders used by meshes, ascending.
    pub fn used_extruders(&self) -> Vec<usize> {
        let mut extruders: Vec<usize> = self
            .meshes
            .iter()
            .map(|mesh| mesh.settings.extruder_nr)
            .collect();
        extruders.sort_unstable();
        extruders.dedup();
        extruders
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh(extruder: usize, filled: &[bool]) -> Mesh {
        let part = Part {
            outline: vec![Polygon::rect(Point2::origin(), Point2::new(1.0, 1.0))],
            ..Default::default()
        };
        Mesh {
            settings: MeshSettings::for_extruder(extruder),
            layers: filled
                .iter()
                .map(|&f| Layer {
                    parts: if f { vec![part.clone()] } else { Vec::new() },
                    ..Default::default()
                })
                .collect(),
        }
    }

    #[test]
    fn test_validate() {
        assert_eq!(Model::default().validate(), Err(SlicerError::EmptyModel));

        let model = Model {
            meshes: vec![mesh(0, &[true, true]), mesh(1, &[true])],
            ..Default::default()
        };
        assert_eq!(
            model.validate(),
            Err(SlicerError::LayerCountMismatch {
                mesh: 1,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_max_filled_layer() {
        let m = mesh(0, &[true, true, false, false]);
        assert_eq!(m.max_filled_layer(), Some(1));
        assert_eq!(mesh(0, &[false, false]).max_filled_layer(), None);
    }

    #[test]
    fn test_wipe_tower_cutoff() {
        let model = Model {
            meshes: vec![
                mesh(0, &[true, true, true, true]),
                mesh(1, &[true, true, false, false]),
            ],
            ..Default::default()
        };
        assert_eq!(model.wipe_tower_cutoff(), Some(1));
        assert_eq!(model.used_extruders(), vec![0, 1]);

        let pinned = Model {
            wipe_tower_cutoff_layer: Some(3),
            ..model
        };
        assert_eq!(pinned.wipe_tower_cutoff(), Some(3));
    }
}
