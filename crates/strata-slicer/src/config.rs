//! Per-feature path configuration.
//!
//! [`LayerConfigs::resolve`] derives every feature's line width, speed, flow
//! and layer height for one layer. The result is a plain value: meshes index
//! into it by position, nothing points back into the settings.

use serde::{Deserialize, Serialize};

use crate::settings::{MeshProfile, Settings};

/// Number of sparse infill combine levels a part may carry.
pub const MAX_SPARSE_COMBINE: usize = 8;

/// Retraction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RetractionConfig {
    /// Retraction length (mm of filament).
    pub amount: f64,
    /// Extra filament primed after the retraction (mm).
    pub prime_amount: f64,
    /// Retraction speed (mm/s).
    pub speed: f64,
    /// Prime speed (mm/s).
    pub prime_speed: f64,
    /// Z lift while retracted (mm).
    pub z_hop: f64,
}

/// Coasting parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CoastingConfig {
    /// Coasting on/off.
    pub enabled: bool,
    /// Volume coasted before a plain travel (mm³).
    pub volume_move: f64,
    /// Paths below this volume coast proportionally less before a travel (mm³).
    pub min_volume_move: f64,
    /// Coasting speed before a plain travel, as a fraction of path speed.
    pub speed_move: f64,
    /// Volume coasted before a retracting travel (mm³).
    pub volume_retract: f64,
    /// Paths below this volume coast proportionally less before a retraction (mm³).
    pub min_volume_retract: f64,
    /// Coasting speed before a retracting travel, as a fraction of path speed.
    pub speed_retract: f64,
}

impl CoastingConfig {
    /// Coasting config from job settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            enabled: settings.coasting_enable,
            volume_move: settings.coasting_volume_move,
            min_volume_move: settings.coasting_min_volume_move,
            speed_move: settings.coasting_speed_move / 100.0,
            volume_retract: settings.coasting_volume_retract,
            min_volume_retract: settings.coasting_min_volume_retract,
            speed_retract: settings.coasting_speed_retract / 100.0,
        }
    }
}

/// Feature class a path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Outermost wall.
    OuterWall,
    /// Any inner wall.
    InnerWall,
    /// Top/bottom skin.
    Skin,
    /// Sparse infill at a combine level.
    Infill(usize),
    /// Support lines.
    Support,
    /// Support roof.
    SupportRoof,
    /// Skirt, brim and shields.
    Skirt,
    /// Raft base, interface and surface.
    Raft,
    /// Wipe/prime tower.
    WipeTower,
    /// Non-extruding move.
    Travel,
}

impl Feature {
    /// Label written into the command stream when this feature starts.
    pub fn label(self) -> &'static str {
        match self {
            Feature::OuterWall => "WALL-OUTER",
            Feature::InnerWall => "WALL-INNER",
            Feature::Skin => "SKIN",
            Feature::Infill(_) => "FILL",
            Feature::Support => "SUPPORT",
            Feature::SupportRoof => "SUPPORT-ROOF",
            Feature::Skirt => "SKIRT",
            Feature::Raft => "RAFT",
            Feature::WipeTower => "PRIME-TOWER",
            Feature::Travel => "TRAVEL",
        }
    }
}

/// Travel behaviour shared by every layer of a job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelConfig {
    /// Travel speed (mm/s).
    pub speed: f64,
    /// Travels longer than this retract (mm).
    pub retraction_min_travel: f64,
    /// Retract before every travel.
    pub always_retract: bool,
    /// Retraction used for travels and forced retractions.
    pub retraction: RetractionConfig,
}

impl TravelConfig {
    /// Travel config from job settings. Disabling combing makes every
    /// travel retract.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            speed: settings.speed_travel,
            retraction_min_travel: settings.retraction_min_travel,
            always_retract: !settings.retraction_combing,
            retraction: settings.retraction(),
        }
    }

    /// Path config for travel segments of a layer.
    pub fn path_config(&self, layer_height: f64) -> PathConfig {
        PathConfig {
            feature: Feature::Travel,
            line_width: 0.0,
            speed: self.speed,
            flow: 0.0,
            layer_height,
            spiralize: false,
            retraction: self.retraction,
        }
    }
}

/// Extrusion parameters for one feature class on one layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathConfig {
    /// Feature this config prints.
    pub feature: Feature,
    /// Line width (mm).
    pub line_width: f64,
    /// Speed (mm/s).
    pub speed: f64,
    /// Flow as a fraction (1.0 = 100%).
    pub flow: f64,
    /// Layer height the extrusion is sized for (mm).
    pub layer_height: f64,
    /// Ramp Z along this path.
    pub spiralize: bool,
    /// Retraction used around this path.
    pub retraction: RetractionConfig,
}

impl PathConfig {
    /// Create a config with spiralize off.
    pub fn new(
        feature: Feature,
        line_width: f64,
        speed: f64,
        flow_percent: f64,
        layer_height: f64,
        retraction: RetractionConfig,
    ) -> Self {
        Self {
            feature,
            line_width,
            speed,
            flow: flow_percent / 100.0,
            layer_height,
            spiralize: false,
            retraction,
        }
    }

    /// Volume extruded per mm of travel (mm³/mm).
    pub fn extrusion_mm3_per_mm(&self) -> f64 {
        self.line_width * self.layer_height * self.flow
    }

    /// Blend the speed towards `initial_speed` on the first `ramp_layers` layers.
    ///
    /// Layer 0 prints at `initial_speed`; each following layer moves linearly
    /// towards the nominal speed, which is reached at `ramp_layers`.
    pub fn smooth_speed(&mut self, initial_speed: f64, layer_nr: usize, ramp_layers: usize) {
        if layer_nr >= ramp_layers {
            return;
        }
        let layer = layer_nr as f64;
        let ramp = ramp_layers as f64;
        self.speed = (self.speed * layer + initial_speed * (ramp - layer)) / ramp;
    }
}

/// Path configs of one mesh for one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshConfigs {
    /// Outer wall.
    pub inset0: PathConfig,
    /// Inner walls.
    pub inset_x: PathConfig,
    /// Top/bottom skin.
    pub skin: PathConfig,
    /// Sparse infill, indexed by combine level.
    pub infill: [PathConfig; MAX_SPARSE_COMBINE],
}

impl MeshConfigs {
    /// Resolve one mesh's configs for a layer of `thickness`.
    pub fn resolve(profile: &MeshProfile, thickness: f64) -> Self {
        let flow = profile.material_flow;
        let retraction = profile.retraction;
        let infill = std::array::from_fn(|level| {
            PathConfig::new(
                Feature::Infill(level),
                profile.infill_line_width,
                profile.speed_infill,
                flow,
                thickness * (level + 1) as f64,
                retraction,
            )
        });
        Self {
            inset0: PathConfig::new(
                Feature::OuterWall,
                profile.wall_line_width_0,
                profile.speed_wall_0,
                flow,
                thickness,
                retraction,
            ),
            inset_x: PathConfig::new(
                Feature::InnerWall,
                profile.wall_line_width_x,
                profile.speed_wall_x,
                flow,
                thickness,
                retraction,
            ),
            skin: PathConfig::new(
                Feature::Skin,
                profile.skin_line_width,
                profile.speed_topbottom,
                flow,
                thickness,
                retraction,
            ),
            infill,
        }
    }

    fn smooth_speed(&mut self, initial_speed: f64, layer_nr: usize, ramp_layers: usize) {
        self.inset0.smooth_speed(initial_speed, layer_nr, ramp_layers);
        self.inset_x.smooth_speed(initial_speed, layer_nr, ramp_layers);
        self.skin.smooth_speed(initial_speed, layer_nr, ramp_layers);
        for config in &mut self.infill {
            config.smooth_speed(initial_speed, layer_nr, ramp_layers);
        }
    }
}

/// Every path config needed to plan one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerConfigs {
    /// Thickness the configs were resolved for (mm).
    pub thickness: f64,
    /// Skirt, brim, ooze and draft shields.
    pub skirt: PathConfig,
    /// Support lines.
    pub support: PathConfig,
    /// Support roofs.
    pub support_roof: PathConfig,
    /// Per-mesh configs, indexed like the model's meshes.
    pub meshes: Vec<MeshConfigs>,
}

impl LayerConfigs {
    /// Resolve all configs for `layer_nr` at `thickness`, including the
    /// initial-layer speed ramp.
    pub fn resolve(
        settings: &Settings,
        profiles: &[MeshProfile],
        layer_nr: usize,
        thickness: f64,
    ) -> Self {
        let retraction = settings.retraction();
        let flow = settings.material_flow;
        let mut configs = Self {
            thickness,
            skirt: PathConfig::new(
                Feature::Skirt,
                settings.skirt_line_width,
                settings.skirt_speed,
                flow,
                thickness,
                retraction,
            ),
            support: PathConfig::new(
                Feature::Support,
                settings.support_line_width,
                settings.speed_support_lines,
                flow,
                thickness,
                retraction,
            ),
            support_roof: PathConfig::new(
                Feature::SupportRoof,
                settings.support_roof_line_width,
                settings.speed_support_roof,
                flow,
                thickness,
                retraction,
            ),
            meshes: profiles
                .iter()
                .map(|profile| MeshConfigs::resolve(profile, thickness))
                .collect(),
        };

        let ramp_layers = settings.speed_slowdown_layers;
        if layer_nr < ramp_layers {
            let initial = settings.speed_layer_0;
            configs.support.smooth_speed(initial, layer_nr, ramp_layers);
            for mesh in &mut configs.meshes {
                mesh.smooth_speed(initial, layer_nr, ramp_layers);
            }
        }
        configs
    }
}

/// Configs for the three raft stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaftConfigs {
    /// Raft base layer.
    pub base: PathConfig,
    /// Raft interface layer.
    pub interface: PathConfig,
    /// Raft surface layers.
    pub surface: PathConfig,
}

impl RaftConfigs {
    /// Raft configs from job settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let retraction = settings.retraction();
        let flow = settings.material_flow;
        Self {
            base: PathConfig::new(
                Feature::Raft,
                settings.raft_base_line_width,
                settings.raft_base_speed,
                flow,
                settings.raft_base_thickness,
                retraction,
            ),
            interface: PathConfig::new(
                Feature::Raft,
                settings.raft_interface_line_width,
                settings.raft_interface_speed,
                flow,
                settings.raft_interface_thickness,
                retraction,
            ),
            surface: PathConfig::new(
                Feature::Raft,
                settings.raft_surface_line_width,
                settings.raft_surface_speed,
                flow,
                settings.raft_surface_thickness,
                retraction,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MeshSettings;
    use approx::assert_relative_eq;

    fn profiles(settings: &Settings) -> Vec<MeshProfile> {
        vec![MeshProfile::resolve(&MeshSettings::default(), settings)]
    }

    #[test]
    fn test_speed_ramp() {
        let settings = Settings {
            speed_layer_0: 10.0,
            speed_infill: 50.0,
            speed_slowdown_layers: 4,
            ..Default::default()
        };
        let profiles = profiles(&settings);
        let speeds: Vec<f64> = (0..6)
            .map(|layer| {
                LayerConfigs::resolve(&settings, &profiles, layer, 0.2).meshes[0].infill[0].speed
            })
            .collect();
        assert_relative_eq!(speeds[0], 10.0);
        assert_relative_eq!(speeds[1], 20.0);
        assert_relative_eq!(speeds[2], 30.0);
        assert_relative_eq!(speeds[3], 40.0);
        assert_relative_eq!(speeds[4], 50.0);
        assert_relative_eq!(speeds[5], 50.0);
    }

    #[test]
    fn test_skirt_and_roof_are_not_ramped() {
        let settings = Settings::default();
        let configs = LayerConfigs::resolve(&settings, &profiles(&settings), 0, 0.3);
        assert_relative_eq!(configs.skirt.speed, settings.skirt_speed);
        assert_relative_eq!(configs.support_roof.speed, settings.speed_support_roof);
        assert_relative_eq!(configs.support.speed, settings.speed_layer_0);
    }

    #[test]
    fn test_combined_infill_layer_height() {
        let settings = Settings::default();
        let configs = LayerConfigs::resolve(&settings, &profiles(&settings), 10, 0.1);
        let infill = &configs.meshes[0].infill;
        assert_relative_eq!(infill[0].layer_height, 0.1);
        assert_relative_eq!(infill[2].layer_height, 0.3);
        assert_eq!(infill[2].feature, Feature::Infill(2));
    }

    #[test]
    fn test_extrusion_volume() {
        let config = PathConfig::new(
            Feature::Skin,
            0.4,
            30.0,
            50.0,
            0.2,
            RetractionConfig::default(),
        );
        assert_relative_eq!(config.extrusion_mm3_per_mm(), 0.04);
    }
}
