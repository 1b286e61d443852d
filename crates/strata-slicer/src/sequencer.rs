//! Layer sequencer: runs a whole job through the planner.
//!
//! One [`LayerPlan`] is built per layer and flushed to the command stream
//! before the next layer starts, so machine state (position, active
//! extruder, running totals) flows strictly from one layer to the next.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{
    CoastingConfig, LayerConfigs, PathConfig, RaftConfigs, TravelConfig, MAX_SPARSE_COMBINE,
};
use crate::cooling::cool_layer;
use crate::error::Result;
use crate::infill::{
    combine_spacing, sparse_infill, uses_infill_wipe, FillGenerator, FillParams, ScanlineFill,
};
use crate::model::{Model, Part, SupportLayer};
use crate::order::{order_polylines, PathOrderOptimizer};
use crate::overlap::{OverlapFlow, ProximityOverlap};
use crate::perimeter::{add_polygons_ordered, emit_surface, emit_walls, WallMode};
use crate::planner::LayerPlan;
use crate::progress::{Progress, Stage};
use crate::settings::{AdhesionType, MeshProfile, Settings};
use crate::skin::{emit_skin, BridgeDetector, OverhangBridge, SkinFill};
use crate::stream::CommandStream;
use crate::support::{emit_support_lines, emit_support_roofs};
use crate::wipe_tower::WipeTower;

/// Clearance above the tallest printed object when moving away (mm).
const CLEARANCE: f64 = 5.0;

/// Statistics of a finished job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStats {
    /// Number of model layers printed.
    pub layer_count: usize,
    /// Tallest object printed so far by this sequencer (mm).
    pub max_height: f64,
    /// Estimated print time (s).
    pub total_time: f64,
    /// Material used per extruder (mm³).
    pub filament_per_extruder: Vec<f64>,
}

/// Drives jobs layer by layer.
///
/// A sequencer may run several jobs in a row ("one at a time" printing);
/// later jobs start by clearing the objects printed before them.
pub struct LayerSequencer {
    settings: Settings,
    fill: Box<dyn FillGenerator>,
    bridge: Box<dyn BridgeDetector>,
    overlap: Box<dyn OverlapFlow>,
    max_object_height: f64,
    job_count: usize,
    extruders: Vec<usize>,
}

impl LayerSequencer {
    /// Create a sequencer with the built-in collaborators.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            fill: Box::new(ScanlineFill),
            bridge: Box::new(OverhangBridge),
            overlap: Box::new(ProximityOverlap),
            max_object_height: 0.0,
            job_count: 0,
            extruders: Vec::new(),
        }
    }

    /// Use another fill generator.
    pub fn with_fill(mut self, fill: impl FillGenerator + 'static) -> Self {
        self.fill = Box::new(fill);
        self
    }

    /// Use another bridge detector.
    pub fn with_bridge(mut self, bridge: impl BridgeDetector + 'static) -> Self {
        self.bridge = Box::new(bridge);
        self
    }

    /// Use another wall overlap computation.
    pub fn with_overlap(mut self, overlap: impl OverlapFlow + 'static) -> Self {
        self.overlap = Box::new(overlap);
        self
    }

    /// Job settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Tallest object printed so far (mm).
    pub fn max_object_height(&self) -> f64 {
        self.max_object_height
    }

    /// Plan `model` and write it to `stream`.
    ///
    /// Settings and model are validated before anything is written. Once
    /// layers are being emitted nothing is fatal: configuration problems
    /// local to a feature are logged and that feature is left empty.
    pub fn run(
        &mut self,
        model: &Model,
        stream: &mut dyn CommandStream,
        progress: &mut dyn Progress,
    ) -> Result<JobStats> {
        self.settings.validate()?;
        model.validate()?;

        let job = Job::new(self, model);
        let total = model.layer_count();
        info!(
            job = self.job_count + 1,
            layers = total,
            meshes = model.meshes.len(),
            raft = job.has_raft,
            "planning job"
        );

        if self.job_count == 0 {
            job.starting_code(stream);
        } else {
            job.next_object_code(stream, self.max_object_height);
        }
        if job.has_raft {
            job.process_raft(stream);
        }
        for layer_nr in 0..total {
            progress.report(Stage::Export, layer_nr + 1, total);
            job.process_layer(stream, layer_nr);
        }

        stream.retract(&self.settings.retraction());
        progress.report(Stage::Finish, total, total);
        stream.set_fan(0.0);

        let top = total
            .checked_sub(1)
            .map_or(0.0, |last| model.print_z(last) + job.raft_height);
        let extruders = job.extruders();
        drop(job);

        self.max_object_height = self.max_object_height.max(top);
        self.job_count += 1;
        for extruder in extruders {
            if !self.extruders.contains(&extruder) {
                self.extruders.push(extruder);
            }
        }
        self.extruders.sort_unstable();

        let extruder_count = self.extruders.last().map_or(1, |e| e + 1);
        let stats = JobStats {
            layer_count: total,
            max_height: self.max_object_height,
            total_time: stream.total_print_time(),
            filament_per_extruder: (0..extruder_count)
                .map(|e| stream.total_filament(e))
                .collect(),
        };
        info!(
            layers = stats.layer_count,
            time = stats.total_time,
            height = stats.max_height,
            "job planned"
        );
        Ok(stats)
    }

    /// End the print: fan off, retract, clear the objects, run the end
    /// code and switch every heater off.
    pub fn finalize(&self, stream: &mut dyn CommandStream) {
        let settings = &self.settings;
        stream.set_fan(0.0);
        stream.retract(&settings.retraction());
        stream.set_z(self.max_object_height + CLEARANCE);
        let here = stream.position();
        stream.travel(here, settings.speed_travel);
        if !settings.machine_end_gcode.is_empty() {
            stream.write_raw(&settings.machine_end_gcode);
        }
        for &extruder in &self.extruders {
            stream.set_temperature(extruder, 0.0, false);
        }
        stream.set_bed_temperature(0.0, false);
        info!(jobs = self.job_count, "print finalized");
    }
}

/// Visiting order of meshes on a layer, grouped by extruder.
///
/// Meshes on `current_extruder` come first. After that, the extruder of the
/// first remaining mesh becomes the target, and so on, so each extruder is
/// switched to at most once per layer.
pub fn mesh_order(model: &Model, current_extruder: usize) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..model.meshes.len()).collect();
    let mut order = Vec::with_capacity(remaining.len());
    let mut target = current_extruder;
    while !remaining.is_empty() {
        remaining.retain(|&idx| {
            if model.meshes[idx].settings.extruder_nr == target {
                order.push(idx);
                false
            } else {
                true
            }
        });
        if let Some(&next) = remaining.first() {
            target = model.meshes[next].settings.extruder_nr;
        }
    }
    order
}

/// Last layer that still gets a draft shield.
fn draft_shield_last_layer(settings: &Settings) -> i64 {
    ((settings.draft_shield_height - settings.layer_height_0) / settings.layer_height).trunc()
        as i64
        + 1
}

/// Everything resolved once per job.
struct Job<'a> {
    settings: &'a Settings,
    model: &'a Model,
    fill: &'a dyn FillGenerator,
    bridge: &'a dyn BridgeDetector,
    overlap: &'a dyn OverlapFlow,
    profiles: Vec<MeshProfile>,
    max_filled: Vec<Option<usize>>,
    support_max_filled: Option<usize>,
    travel: TravelConfig,
    coasting: CoastingConfig,
    wipe_tower: Option<WipeTower>,
    has_raft: bool,
    raft_height: f64,
}

impl<'a> Job<'a> {
    fn new(sequencer: &'a LayerSequencer, model: &'a Model) -> Self {
        let settings = &sequencer.settings;
        let has_raft = settings.adhesion_type == AdhesionType::Raft;
        let raft_height = if has_raft {
            settings.raft_base_thickness
                + settings.raft_interface_thickness
                + settings.raft_surface_thickness * settings.raft_surface_layers as f64
        } else {
            0.0
        };
        Self {
            settings,
            model,
            fill: sequencer.fill.as_ref(),
            bridge: sequencer.bridge.as_ref(),
            overlap: sequencer.overlap.as_ref(),
            profiles: model
                .meshes
                .iter()
                .map(|mesh| MeshProfile::resolve(&mesh.settings, settings))
                .collect(),
            max_filled: model.meshes.iter().map(|mesh| mesh.max_filled_layer()).collect(),
            support_max_filled: model.support.max_filled_layer(),
            travel: TravelConfig::from_settings(settings),
            coasting: CoastingConfig::from_settings(settings),
            wipe_tower: WipeTower::new(model, settings),
            has_raft,
            raft_height,
        }
    }

    /// Every extruder this job may have used.
    fn extruders(&self) -> Vec<usize> {
        let s = self.settings;
        let mut extruders = self.model.used_extruders();
        if self.model.support.generated {
            extruders.extend(
                [
                    s.support_extruder_nr,
                    s.support_extruder_nr_layer_1,
                    s.support_roof_extruder_nr,
                ]
                .into_iter()
                .flatten(),
            );
        }
        if self.has_raft {
            extruders.extend(s.support_extruder_nr);
        }
        extruders.sort_unstable();
        extruders.dedup();
        extruders
    }

    fn starting_code(&self, stream: &mut dyn CommandStream) {
        let s = self.settings;
        if s.material_bed_temperature > 0.0 {
            stream.set_bed_temperature(s.material_bed_temperature, true);
        }
        for wait in [false, true] {
            for profile in &self.profiles {
                if profile.material_print_temperature > 0.0 {
                    stream.set_temperature(
                        profile.extruder_nr,
                        profile.material_print_temperature,
                        wait,
                    );
                }
            }
        }
        if !s.machine_start_gcode.is_empty() {
            stream.write_raw(&s.machine_start_gcode);
        }
        stream.comment(concat!("Generated with strata ", env!("CARGO_PKG_VERSION")));
    }

    fn next_object_code(&self, stream: &mut dyn CommandStream, max_object_height: f64) {
        let speed = self.settings.speed_travel;
        stream.set_fan(0.0);
        stream.reset_extrusion();
        stream.set_z(max_object_height + CLEARANCE);
        let here = stream.position();
        stream.travel(here, speed);
        if let Some(min) = self.model.min_xy() {
            stream.travel(min, speed);
        }
    }

    fn process_raft(&self, stream: &mut dyn CommandStream) {
        let s = self.settings;
        let raft = RaftConfigs::from_settings(s);

        let z = s.raft_base_thickness;
        let mut plan = self.raft_plan(stream, -3, z, s.raft_base_thickness);
        if let Some(extruder) = s.support_extruder_nr {
            plan.set_extruder(extruder);
        }
        add_polygons_ordered(&mut plan, &self.model.raft_outline, &raft.base, None);
        self.raft_lines(&mut plan, &raft.base, s.raft_base_line_spacing, 0.0);
        stream.set_fan(s.raft_base_fan_speed);
        plan.write_gcode(stream, false, s.raft_base_thickness);

        let z = z + s.raft_interface_thickness;
        let mut plan = self.raft_plan(stream, -2, z, s.raft_interface_thickness);
        let angle = if s.raft_surface_layers > 0 { 45.0 } else { 90.0 };
        self.raft_lines(&mut plan, &raft.interface, s.raft_interface_line_spacing, angle);
        plan.write_gcode(stream, false, s.raft_interface_thickness);

        for surface in 1..=s.raft_surface_layers {
            let z = z + s.raft_surface_thickness * surface as f64;
            let mut plan = self.raft_plan(stream, -1, z, s.raft_surface_thickness);
            let angle = 90.0 * surface as f64;
            self.raft_lines(&mut plan, &raft.surface, s.raft_surface_line_spacing, angle);
            plan.write_gcode(stream, false, s.raft_surface_thickness);
        }
        debug!(height = self.raft_height, "raft planned");
    }

    fn raft_plan(
        &self,
        stream: &mut dyn CommandStream,
        layer_nr: i64,
        z: f64,
        thickness: f64,
    ) -> LayerPlan {
        stream.layer_comment(layer_nr);
        stream.comment("RAFT");
        let plan = LayerPlan::new(layer_nr, z, thickness, &*stream, &self.travel, &self.coasting);
        stream.set_z(z);
        plan
    }

    fn raft_lines(&self, plan: &mut LayerPlan, config: &PathConfig, spacing: f64, angle: f64) {
        let params = FillParams::new(config.line_width, spacing, angle)
            .with_overlap(self.settings.fill_overlap);
        let lines = self.fill.lines(&self.model.raft_outline, &params);
        let ordered = order_polylines(plan.last_position(), &lines);
        plan.add_open_path(&ordered, config, None);
    }

    fn process_layer(&self, stream: &mut dyn CommandStream, layer_nr: usize) {
        let s = self.settings;
        let model = self.model;
        let thickness = if layer_nr == 0 && !self.has_raft {
            s.layer_height_0
        } else {
            s.layer_height
        };
        let configs = LayerConfigs::resolve(s, &self.profiles, layer_nr, thickness);

        stream.layer_comment(layer_nr as i64);
        let z = model.print_z(layer_nr) + self.raft_height;
        let mut plan = LayerPlan::new(
            layer_nr as i64,
            z,
            thickness,
            &*stream,
            &self.travel,
            &self.coasting,
        );
        stream.set_z(z);

        if layer_nr == 0 {
            let start = model
                .skirt
                .last()
                .and_then(|skirt| skirt.closest_point_to(&stream.position()));
            if let Some(start) = start {
                plan.add_travel(start);
            }
            add_polygons_ordered(&mut plan, &model.skirt, &configs.skirt, None);
        }

        let support_first = model.support.generated
            && s.support_extruder(layer_nr).is_some_and(|e| e == plan.extruder());
        if support_first {
            self.emit_support(&mut plan, &configs, layer_nr);
        }

        if let Some(shield) = model.ooze_shield.get(layer_nr) {
            plan.set_always_retract(true);
            add_polygons_ordered(&mut plan, shield, &configs.skirt, None);
            plan.set_always_retract(self.travel.always_retract);
        }
        if !model.draft_shield.is_empty() && layer_nr as i64 <= draft_shield_last_layer(s) {
            plan.set_always_retract(true);
            add_polygons_ordered(&mut plan, &model.draft_shield, &configs.skirt, None);
            plan.set_always_retract(self.travel.always_retract);
        }

        for mesh_idx in mesh_order(model, plan.extruder()) {
            self.emit_mesh(&mut plan, &configs, mesh_idx, layer_nr);
        }

        if !support_first {
            self.emit_support(&mut plan, &configs, layer_nr);
        }

        let cooling = cool_layer(&mut plan, s, layer_nr);
        stream.set_fan(cooling.fan_speed);
        // Spiral ramps on layer 0 climb the first layer height, raft or not
        let ramp_height = if layer_nr > 0 {
            s.layer_height
        } else {
            s.layer_height_0
        };
        plan.write_gcode(stream, s.cool_lift_head, ramp_height);
        debug!(
            layer = layer_nr,
            thickness,
            z,
            segments = plan.segments().len(),
            "layer written"
        );
    }

    /// Switch to `extruder`, printing the wipe tower if it changed.
    fn switch_extruder(
        &self,
        plan: &mut LayerPlan,
        configs: &LayerConfigs,
        layer_nr: usize,
        extruder: usize,
    ) {
        let previous = plan.extruder();
        if plan.set_extruder(extruder) {
            self.wipe(plan, configs, layer_nr, previous);
        }
    }

    fn wipe(&self, plan: &mut LayerPlan, configs: &LayerConfigs, layer_nr: usize, previous: usize) {
        let (Some(tower), Some(mesh)) = (&self.wipe_tower, configs.meshes.first()) else {
            return;
        };
        tower.emit(plan, layer_nr, &mesh.inset_x, self.settings, previous);
    }

    fn emit_mesh(&self, plan: &mut LayerPlan, configs: &LayerConfigs, mesh_idx: usize, layer_nr: usize) {
        let s = self.settings;
        let profile = &self.profiles[mesh_idx];
        let mesh = &self.model.meshes[mesh_idx];

        let previous = plan.extruder();
        let changed = plan.set_extruder(profile.extruder_nr);
        if self.max_filled[mesh_idx].is_none_or(|max| layer_nr > max) {
            return;
        }
        if changed {
            self.wipe(plan, configs, layer_nr, previous);
        }

        let (Some(layer), Some(mesh_configs)) =
            (mesh.layers.get(layer_nr), configs.meshes.get(mesh_idx))
        else {
            return;
        };

        if s.magic_mesh_surface_mode {
            let mode = if profile.magic_spiralize {
                WallMode::Spiral
            } else {
                WallMode::Normal
            };
            emit_surface(plan, layer, mesh_configs, mode);
            return;
        }

        // Parts are ordered from where the layer started, not from the
        // previous mesh or support
        let start = plan.start_position();
        let mut optimizer = PathOrderOptimizer::new(start);
        for part in &layer.parts {
            optimizer.add_point(part.start_point().unwrap_or(start));
        }

        let fill_angle = if layer_nr % 2 == 1 { 135.0 } else { 45.0 };
        let wall_mode = WallMode::for_layer(profile.magic_spiralize, layer_nr, s.bottom_layers);
        let overlap = s
            .travel_compensate_overlapping_walls_enabled
            .then_some(self.overlap);
        let skin = SkinFill::new(s, self.fill, self.bridge, profile.fill_overlap);
        let prior_layer = layer_nr.checked_sub(1).and_then(|prior| mesh.layers.get(prior));

        for part_idx in optimizer.optimize() {
            let part = &layer.parts[part_idx];
            self.emit_infill(plan, part, mesh_configs.infill.as_slice(), profile, fill_angle);
            if s.wall_line_count > 0 {
                emit_walls(plan, part, mesh_configs, wall_mode, overlap);
            }
            emit_skin(
                plan,
                part,
                &mesh_configs.skin,
                &skin,
                prior_layer,
                layer_nr,
                fill_angle,
            );
        }
    }

    /// Sparse infill of a part: thicker combined levels first, then the
    /// single-layer level with the optional wipe.
    fn emit_infill(
        &self,
        plan: &mut LayerPlan,
        part: &Part,
        configs: &[PathConfig],
        profile: &MeshProfile,
        fill_angle: f64,
    ) {
        let spacing = profile.infill_line_distance;
        if spacing <= 0.0 {
            return;
        }
        let pattern = &self.settings.fill_pattern;
        let levels = part.sparse_outline.len().min(MAX_SPARSE_COMBINE);
        for level in (1..levels).chain((levels > 0).then_some(0)) {
            let config = &configs[level];
            let params = FillParams::new(
                config.line_width,
                combine_spacing(spacing, level),
                fill_angle,
            )
            .with_overlap(profile.fill_overlap);
            let fill = sparse_infill(self.fill, pattern, &part.sparse_outline[level], &params);

            let wipe = (level == 0 && uses_infill_wipe(pattern))
                .then_some(self.settings.infill_wipe_dist);
            add_polygons_ordered(plan, &fill.polygons, config, None);
            let lines = order_polylines(plan.last_position(), &fill.lines);
            plan.add_open_path(&lines, config, wipe);
        }
    }

    fn emit_support(&self, plan: &mut LayerPlan, configs: &LayerConfigs, layer_nr: usize) {
        if !self.model.support.generated {
            return;
        }
        let Some(layer) = self.model.support.layer(layer_nr) else {
            return;
        };
        if !self.settings.support_roof_enable {
            self.support_lines(plan, configs, layer_nr, layer);
            return;
        }
        let roofs_first = self
            .settings
            .support_roof_extruder(layer_nr)
            .is_some_and(|e| e == plan.extruder());
        if roofs_first {
            self.support_roofs(plan, configs, layer_nr, layer);
            self.support_lines(plan, configs, layer_nr, layer);
        } else {
            self.support_lines(plan, configs, layer_nr, layer);
            self.support_roofs(plan, configs, layer_nr, layer);
        }
    }

    fn support_lines(
        &self,
        plan: &mut LayerPlan,
        configs: &LayerConfigs,
        layer_nr: usize,
        layer: &SupportLayer,
    ) {
        if layer.support_areas.is_empty() || self.support_max_filled.is_none_or(|max| layer_nr > max)
        {
            return;
        }
        if let Some(extruder) = self.settings.support_extruder(layer_nr) {
            self.switch_extruder(plan, configs, layer_nr, extruder);
        }
        emit_support_lines(
            plan,
            &layer.support_areas,
            &configs.support,
            self.settings,
            layer_nr,
            self.fill,
        );
    }

    fn support_roofs(
        &self,
        plan: &mut LayerPlan,
        configs: &LayerConfigs,
        layer_nr: usize,
        layer: &SupportLayer,
    ) {
        if layer.roofs.is_empty() {
            return;
        }
        if let Some(extruder) = self.settings.support_roof_extruder(layer_nr) {
            self.switch_extruder(plan, configs, layer_nr, extruder);
        }
        emit_support_roofs(
            plan,
            &layer.roofs,
            &configs.support_roof,
            self.settings,
            layer_nr,
            self.fill,
        );
    }
}
