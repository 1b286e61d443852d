//! Job settings.
//!
//! Values use the units a user would type: millimetres, mm/s, seconds, and
//! percentages as `0..=100` numbers. [`crate::config`] turns them into the
//! per-layer path configs the planner consumes.

use serde::{Deserialize, Serialize};

use crate::config::RetractionConfig;
use crate::error::{Result, SlicerError};
use crate::infill::FillPattern;
use crate::path::Point2;

/// Build plate adhesion strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdhesionType {
    /// Nothing below or around the model.
    None,
    /// Skirt loops around the first layer.
    #[default]
    Skirt,
    /// Brim attached to the first layer (generated upstream as skirt geometry).
    Brim,
    /// Sacrificial raft layers below layer 0.
    Raft,
}

/// Where gaps left between walls are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapFill {
    /// Never fill perimeter gaps.
    Nowhere,
    /// Fill every perimeter gap.
    #[default]
    Everywhere,
}

/// Global settings for one print job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Layer height for layers above the first (mm).
    pub layer_height: f64,
    /// First layer height when no raft is printed (mm).
    pub layer_height_0: f64,

    /// Number of wall loops.
    pub wall_line_count: usize,
    /// Outer wall line width (mm).
    pub wall_line_width_0: f64,
    /// Inner wall line width (mm).
    pub wall_line_width_x: f64,
    /// Outer wall speed (mm/s).
    pub speed_wall_0: f64,
    /// Inner wall speed (mm/s).
    pub speed_wall_x: f64,
    /// Reduce outer wall flow where it overlaps itself.
    pub travel_compensate_overlapping_walls_enabled: bool,

    /// Top/bottom skin line width (mm).
    pub skin_line_width: f64,
    /// Top/bottom skin speed (mm/s).
    pub speed_topbottom: f64,
    /// Number of top skin layers.
    pub top_layers: usize,
    /// Number of bottom skin layers.
    pub bottom_layers: usize,
    /// Add an extra -45° skin rotation every second pair of layers.
    pub skin_alternate_rotation: bool,
    /// Pattern for top/bottom skin.
    pub top_bottom_pattern: FillPattern,
    /// Gap filling between walls.
    pub fill_perimeter_gaps: GapFill,

    /// Sparse infill line width (mm).
    pub infill_line_width: f64,
    /// Sparse infill speed (mm/s).
    pub speed_infill: f64,
    /// Distance between sparse infill lines (mm). Zero disables infill.
    pub infill_line_distance: f64,
    /// Infill overlap into the walls (% of line width).
    pub fill_overlap: f64,
    /// Sparse infill pattern.
    pub fill_pattern: FillPattern,
    /// Non-extruding wipe after each infill line (mm).
    pub infill_wipe_dist: f64,
    /// Flow multiplier (%).
    pub material_flow: f64,

    /// Speed for the first layer (mm/s).
    pub speed_layer_0: f64,
    /// Layers over which speed ramps from the first layer speed to nominal.
    pub speed_slowdown_layers: usize,

    /// Travel speed (mm/s).
    pub speed_travel: f64,
    /// Travels longer than this retract (mm).
    pub retraction_min_travel: f64,
    /// Keep travels inside printed outlines instead of retracting every travel.
    pub retraction_combing: bool,
    /// Retraction length (mm of filament).
    pub retraction_amount: f64,
    /// Extra filament primed after a retraction (mm).
    pub retraction_extra_prime_amount: f64,
    /// Retraction speed (mm/s).
    pub retraction_retract_speed: f64,
    /// Prime speed (mm/s).
    pub retraction_prime_speed: f64,
    /// Z lift while retracted (mm).
    pub retraction_hop: f64,

    /// Enable coasting.
    pub coasting_enable: bool,
    /// Volume coasted before a non-retracting travel (mm³).
    pub coasting_volume_move: f64,
    /// Minimum path volume for full coasting before a travel (mm³).
    pub coasting_min_volume_move: f64,
    /// Coasting speed before a travel (% of path speed).
    pub coasting_speed_move: f64,
    /// Volume coasted before a retraction (mm³).
    pub coasting_volume_retract: f64,
    /// Minimum path volume for full coasting before a retraction (mm³).
    pub coasting_min_volume_retract: f64,
    /// Coasting speed before a retraction (% of path speed).
    pub coasting_speed_retract: f64,

    /// Skirt speed (mm/s).
    pub skirt_speed: f64,
    /// Skirt line width (mm).
    pub skirt_line_width: f64,

    /// Support line width (mm).
    pub support_line_width: f64,
    /// Support speed (mm/s).
    pub speed_support_lines: f64,
    /// Support roof line width (mm).
    pub support_roof_line_width: f64,
    /// Support roof speed (mm/s).
    pub speed_support_roof: f64,
    /// Extruder printing support, if any.
    pub support_extruder_nr: Option<usize>,
    /// Extruder printing support on layer 0, if any.
    pub support_extruder_nr_layer_1: Option<usize>,
    /// Extruder printing support roofs. Falls back to the support extruder.
    pub support_roof_extruder_nr: Option<usize>,
    /// Print dense roofs on top of support.
    pub support_roof_enable: bool,
    /// Distance between support lines (mm). Zero disables support lines.
    pub support_line_distance: f64,
    /// Support pattern.
    pub support_pattern: FillPattern,
    /// Connect zigzag support lines.
    pub support_connect_zigzags: bool,
    /// Thickness of support roofs (mm).
    pub support_roof_height: f64,

    /// Adhesion type.
    pub adhesion_type: AdhesionType,
    /// Raft base layer thickness (mm).
    pub raft_base_thickness: f64,
    /// Raft base line width (mm).
    pub raft_base_line_width: f64,
    /// Raft base line spacing (mm).
    pub raft_base_line_spacing: f64,
    /// Raft base speed (mm/s).
    pub raft_base_speed: f64,
    /// Raft interface layer thickness (mm).
    pub raft_interface_thickness: f64,
    /// Raft interface line width (mm).
    pub raft_interface_line_width: f64,
    /// Raft interface line spacing (mm).
    pub raft_interface_line_spacing: f64,
    /// Raft interface speed (mm/s).
    pub raft_interface_speed: f64,
    /// Raft surface layer thickness (mm).
    pub raft_surface_thickness: f64,
    /// Raft surface line width (mm).
    pub raft_surface_line_width: f64,
    /// Raft surface line spacing (mm).
    pub raft_surface_line_spacing: f64,
    /// Raft surface speed (mm/s).
    pub raft_surface_speed: f64,
    /// Number of raft surface layers.
    pub raft_surface_layers: usize,
    /// Fan speed while printing the raft base (%).
    pub raft_base_fan_speed: f64,

    /// Height up to which the draft shield is printed (mm).
    pub draft_shield_height: f64,

    /// Print the sliced surface instead of a solid.
    pub magic_mesh_surface_mode: bool,
    /// Spiralize the outer wall ("vase" mode).
    pub magic_spiralize: bool,

    /// Wipe tower footprint size (mm). Zero disables the tower.
    pub wipe_tower_size: f64,
    /// Print wipe tower rings from the inside out.
    pub wipe_tower_dir_outward: bool,

    /// Minimum time per layer (s).
    pub cool_min_layer_time: f64,
    /// Slowest speed the minimum layer time may force (mm/s).
    pub cool_min_speed: f64,
    /// Fan speed for long layers (%).
    pub cool_fan_speed_min: f64,
    /// Fan speed for short layers (%).
    pub cool_fan_speed_max: f64,
    /// Layer time below which the fan ramps towards its maximum (s).
    pub cool_min_layer_time_fan_speed_max: f64,
    /// First layer printed at the full computed fan speed.
    pub cool_fan_full_layer: usize,
    /// Lift the head and wait when a layer is still too short after slowdown.
    pub cool_lift_head: bool,

    /// Bed temperature (°C). Zero leaves the bed alone.
    pub material_bed_temperature: f64,
    /// Nozzle temperature (°C). Zero leaves the heaters alone.
    pub material_print_temperature: f64,

    /// Nozzle offsets per extruder (mm).
    pub machine_extruder_offsets: Vec<Point2>,
    /// Raw code written once at the start of the first job.
    pub machine_start_gcode: String,
    /// Raw code written by the job epilogue.
    pub machine_end_gcode: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            layer_height: 0.1,
            layer_height_0: 0.3,

            wall_line_count: 2,
            wall_line_width_0: 0.4,
            wall_line_width_x: 0.4,
            speed_wall_0: 30.0,
            speed_wall_x: 60.0,
            travel_compensate_overlapping_walls_enabled: false,

            skin_line_width: 0.4,
            speed_topbottom: 30.0,
            top_layers: 6,
            bottom_layers: 6,
            skin_alternate_rotation: false,
            top_bottom_pattern: FillPattern::Lines,
            fill_perimeter_gaps: GapFill::Everywhere,

            infill_line_width: 0.4,
            speed_infill: 60.0,
            infill_line_distance: 2.0,
            fill_overlap: 10.0,
            fill_pattern: FillPattern::Grid,
            infill_wipe_dist: 0.0,
            material_flow: 100.0,

            speed_layer_0: 15.0,
            speed_slowdown_layers: 4,

            speed_travel: 150.0,
            retraction_min_travel: 1.5,
            retraction_combing: true,
            retraction_amount: 4.5,
            retraction_extra_prime_amount: 0.0,
            retraction_retract_speed: 25.0,
            retraction_prime_speed: 25.0,
            retraction_hop: 0.0,

            coasting_enable: false,
            coasting_volume_move: 0.064,
            coasting_min_volume_move: 0.8,
            coasting_speed_move: 90.0,
            coasting_volume_retract: 0.064,
            coasting_min_volume_retract: 0.6,
            coasting_speed_retract: 90.0,

            skirt_speed: 30.0,
            skirt_line_width: 0.4,

            support_line_width: 0.4,
            speed_support_lines: 60.0,
            support_roof_line_width: 0.4,
            speed_support_roof: 40.0,
            support_extruder_nr: None,
            support_extruder_nr_layer_1: None,
            support_roof_extruder_nr: None,
            support_roof_enable: false,
            support_line_distance: 2.66,
            support_pattern: FillPattern::ZigZag,
            support_connect_zigzags: true,
            support_roof_height: 1.0,

            adhesion_type: AdhesionType::Skirt,
            raft_base_thickness: 0.3,
            raft_base_line_width: 1.0,
            raft_base_line_spacing: 3.0,
            raft_base_speed: 15.0,
            raft_interface_thickness: 0.27,
            raft_interface_line_width: 0.4,
            raft_interface_line_spacing: 0.8,
            raft_interface_speed: 15.0,
            raft_surface_thickness: 0.1,
            raft_surface_line_width: 0.3,
            raft_surface_line_spacing: 0.3,
            raft_surface_speed: 20.0,
            raft_surface_layers: 2,
            raft_base_fan_speed: 0.0,

            draft_shield_height: 10.0,

            magic_mesh_surface_mode: false,
            magic_spiralize: false,

            wipe_tower_size: 0.0,
            wipe_tower_dir_outward: false,

            cool_min_layer_time: 5.0,
            cool_min_speed: 10.0,
            cool_fan_speed_min: 100.0,
            cool_fan_speed_max: 100.0,
            cool_min_layer_time_fan_speed_max: 10.0,
            cool_fan_full_layer: 1,
            cool_lift_head: false,

            material_bed_temperature: 60.0,
            material_print_temperature: 210.0,

            machine_extruder_offsets: Vec::new(),
            machine_start_gcode: String::new(),
            machine_end_gcode: String::new(),
        }
    }
}

impl Settings {
    /// Validate settings.
    pub fn validate(&self) -> Result<()> {
        if self.layer_height <= 0.0 || self.layer_height > 1.0 {
            return Err(SlicerError::InvalidSettings(
                "layer_height must be between 0 and 1mm".into(),
            ));
        }
        if self.layer_height_0 <= 0.0 {
            return Err(SlicerError::InvalidSettings(
                "layer_height_0 must be positive".into(),
            ));
        }
        let widths = [
            ("wall_line_width_0", self.wall_line_width_0),
            ("wall_line_width_x", self.wall_line_width_x),
            ("skin_line_width", self.skin_line_width),
            ("infill_line_width", self.infill_line_width),
            ("skirt_line_width", self.skirt_line_width),
            ("support_line_width", self.support_line_width),
            ("support_roof_line_width", self.support_roof_line_width),
        ];
        for (name, width) in widths {
            if width <= 0.0 {
                return Err(SlicerError::InvalidSettings(format!(
                    "{name} must be positive"
                )));
            }
        }
        let speeds = [
            ("speed_wall_0", self.speed_wall_0),
            ("speed_wall_x", self.speed_wall_x),
            ("speed_topbottom", self.speed_topbottom),
            ("speed_infill", self.speed_infill),
            ("speed_layer_0", self.speed_layer_0),
            ("speed_travel", self.speed_travel),
            ("skirt_speed", self.skirt_speed),
            ("speed_support_lines", self.speed_support_lines),
            ("speed_support_roof", self.speed_support_roof),
        ];
        for (name, speed) in speeds {
            if speed <= 0.0 {
                return Err(SlicerError::InvalidSettings(format!(
                    "{name} must be positive"
                )));
            }
        }
        if self.cool_min_speed < 0.0 {
            return Err(SlicerError::InvalidSettings(
                "cool_min_speed must not be negative".into(),
            ));
        }
        if self.infill_line_distance < 0.0 || self.support_line_distance < 0.0 {
            return Err(SlicerError::InvalidSettings(
                "line distances must not be negative".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.cool_fan_speed_min)
            || !(0.0..=100.0).contains(&self.cool_fan_speed_max)
        {
            return Err(SlicerError::InvalidSettings(
                "fan speeds must be between 0 and 100%".into(),
            ));
        }
        Ok(())
    }

    /// Retraction config shared by every mesh unless overridden.
    pub fn retraction(&self) -> RetractionConfig {
        RetractionConfig {
            amount: self.retraction_amount,
            prime_amount: self.retraction_extra_prime_amount,
            speed: self.retraction_retract_speed,
            prime_speed: self.retraction_prime_speed,
            z_hop: self.retraction_hop,
        }
    }

    /// Nozzle offset of an extruder, zero when not configured.
    pub fn extruder_offset(&self, extruder: usize) -> Point2 {
        self.machine_extruder_offsets
            .get(extruder)
            .copied()
            .unwrap_or_else(Point2::origin)
    }

    /// Support extruder for a given layer.
    pub fn support_extruder(&self, layer_nr: usize) -> Option<usize> {
        if layer_nr == 0 {
            self.support_extruder_nr_layer_1.or(self.support_extruder_nr)
        } else {
            self.support_extruder_nr
        }
    }

    /// Support roof extruder for a given layer.
    pub fn support_roof_extruder(&self, layer_nr: usize) -> Option<usize> {
        self.support_roof_extruder_nr
            .or_else(|| self.support_extruder(layer_nr))
    }
}

/// Per-mesh overrides of the global settings.
///
/// Every `None` falls back to the global value when the job starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshSettings {
    /// Extruder printing this mesh.
    pub extruder_nr: usize,
    /// Outer wall line width (mm).
    pub wall_line_width_0: Option<f64>,
    /// Inner wall line width (mm).
    pub wall_line_width_x: Option<f64>,
    /// Outer wall speed (mm/s).
    pub speed_wall_0: Option<f64>,
    /// Inner wall speed (mm/s).
    pub speed_wall_x: Option<f64>,
    /// Skin line width (mm).
    pub skin_line_width: Option<f64>,
    /// Skin speed (mm/s).
    pub speed_topbottom: Option<f64>,
    /// Infill line width (mm).
    pub infill_line_width: Option<f64>,
    /// Infill speed (mm/s).
    pub speed_infill: Option<f64>,
    /// Infill line distance (mm).
    pub infill_line_distance: Option<f64>,
    /// Infill overlap (%).
    pub fill_overlap: Option<f64>,
    /// Flow (%).
    pub material_flow: Option<f64>,
    /// Nozzle temperature (°C).
    pub material_print_temperature: Option<f64>,
    /// Spiralize the outer wall.
    pub magic_spiralize: Option<bool>,
    /// Mesh-specific retraction.
    pub retraction: Option<RetractionConfig>,
}

impl MeshSettings {
    /// Settings for a mesh printed by `extruder_nr` with no other overrides.
    pub fn for_extruder(extruder_nr: usize) -> Self {
        Self {
            extruder_nr,
            ..Default::default()
        }
    }
}

/// Mesh settings with every override resolved against the global settings.
///
/// Built once per job and indexed by mesh number.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshProfile {
    /// Extruder printing this mesh.
    pub extruder_nr: usize,
    /// Outer wall line width (mm).
    pub wall_line_width_0: f64,
    /// Inner wall line width (mm).
    pub wall_line_width_x: f64,
    /// Outer wall speed (mm/s).
    pub speed_wall_0: f64,
    /// Inner wall speed (mm/s).
    pub speed_wall_x: f64,
    /// Skin line width (mm).
    pub skin_line_width: f64,
    /// Skin speed (mm/s).
    pub speed_topbottom: f64,
    /// Infill line width (mm).
    pub infill_line_width: f64,
    /// Infill speed (mm/s).
    pub speed_infill: f64,
    /// Infill line distance (mm).
    pub infill_line_distance: f64,
    /// Infill overlap (%).
    pub fill_overlap: f64,
    /// Flow (%).
    pub material_flow: f64,
    /// Nozzle temperature (°C).
    pub material_print_temperature: f64,
    /// Spiralize the outer wall.
    pub magic_spiralize: bool,
    /// Retraction used by every path of this mesh.
    pub retraction: RetractionConfig,
}

impl MeshProfile {
    /// Resolve mesh overrides against the global settings.
    pub fn resolve(mesh: &MeshSettings, global: &Settings) -> Self {
        Self {
            extruder_nr: mesh.extruder_nr,
            wall_line_width_0: mesh.wall_line_width_0.unwrap_or(global.wall_line_width_0),
            wall_line_width_x: mesh.wall_line_width_x.unwrap_or(global.wall_line_width_x),
            speed_wall_0: mesh.speed_wall_0.unwrap_or(global.speed_wall_0),
            speed_wall_x: mesh.speed_wall_x.unwrap_or(global.speed_wall_x),
            skin_line_width: mesh.skin_line_width.unwrap_or(global.skin_line_width),
            speed_topbottom: mesh.speed_topbottom.unwrap_or(global.speed_topbottom),
            infill_line_width: mesh.infill_line_width.unwrap_or(global.infill_line_width),
            speed_infill: mesh.speed_infill.unwrap_or(global.speed_infill),
            infill_line_distance: mesh
                .infill_line_distance
                .unwrap_or(global.infill_line_distance),
            fill_overlap: mesh.fill_overlap.unwrap_or(global.fill_overlap),
            material_flow: mesh.material_flow.unwrap_or(global.material_flow),
            material_print_temperature: mesh
                .material_print_temperature
                .unwrap_or(global.material_print_temperature),
            magic_spiralize: mesh.magic_spiralize.unwrap_or(global.magic_spiralize),
            retraction: mesh.retraction.unwrap_or_else(|| global.retraction()),
        }
    }
}
