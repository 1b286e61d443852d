//! Per-layer path planner.
//!
//! A [`LayerPlan`] collects the travel and extrusion moves of one layer in
//! call order, decides retractions, applies the minimum layer time and
//! finally writes everything to a [`CommandStream`]. It never reorders
//! what it is given: visiting order is decided by the callers.

use tracing::trace;

use crate::config::{CoastingConfig, PathConfig, RetractionConfig, TravelConfig};
use crate::overlap::OverlapFlow;
use crate::path::{Point2, Polygon, Polyline};
use crate::stream::CommandStream;

const EPS: f64 = 1e-9;

/// Z lift used when a short layer waits for cooling (mm).
const HEAD_LIFT: f64 = 3.0;

/// Remaining layer time below which no cooling delay is added (s).
const EXTRA_TIME_TOLERANCE: f64 = 0.1;

/// Kind of a planned segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// Non-extruding move.
    Travel,
    /// Extruding move.
    Extrusion,
}

/// Consecutive moves sharing config, kind and extruder.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Config the moves were added with.
    pub config: PathConfig,
    /// Travel or extrusion.
    pub kind: SegmentKind,
    /// Extruder printing the segment.
    pub extruder: usize,
    /// Move destinations, in order.
    pub points: Vec<Point2>,
    /// Flow multiplier per destination (extrusion only).
    pub flows: Vec<f64>,
    /// Retract before this travel.
    pub retract: bool,
    /// Effective speed after minimum layer time scaling (mm/s).
    pub speed: f64,
}

/// Moves of one layer, in print order.
#[derive(Debug, Clone)]
pub struct LayerPlan {
    layer_nr: i64,
    z: f64,
    start_position: Point2,
    last_position: Point2,
    extruder: usize,
    always_retract: bool,
    travel: TravelConfig,
    travel_config: PathConfig,
    coasting: CoastingConfig,
    retraction: RetractionConfig,
    extra_time: f64,
    segments: Vec<Segment>,
}

impl LayerPlan {
    /// Start a plan where `stream` currently is.
    pub fn new(
        layer_nr: i64,
        z: f64,
        layer_height: f64,
        stream: &dyn CommandStream,
        travel: &TravelConfig,
        coasting: &CoastingConfig,
    ) -> Self {
        let position = stream.position();
        Self {
            layer_nr,
            z,
            start_position: position,
            last_position: position,
            extruder: stream.extruder(),
            always_retract: travel.always_retract,
            travel: *travel,
            travel_config: travel.path_config(layer_height),
            coasting: *coasting,
            retraction: travel.retraction,
            extra_time: 0.0,
            segments: Vec::new(),
        }
    }

    /// Layer index (negative for raft layers).
    pub fn layer_nr(&self) -> i64 {
        self.layer_nr
    }

    /// Print Z of the layer.
    pub fn z(&self) -> f64 {
        self.z
    }

    /// Extruder new paths are assigned to.
    pub fn extruder(&self) -> usize {
        self.extruder
    }

    /// Position the layer starts from.
    pub fn start_position(&self) -> Point2 {
        self.start_position
    }

    /// Position after the last added path.
    pub fn last_position(&self) -> Point2 {
        self.last_position
    }

    /// Whether every travel retracts.
    pub fn always_retract(&self) -> bool {
        self.always_retract
    }

    /// Planned segments.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Check if nothing was planned.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Cooling delay still needed after speed scaling (s).
    pub fn extra_time(&self) -> f64 {
        self.extra_time
    }

    /// Switch the extruder for subsequent paths. Returns true if it changed.
    pub fn set_extruder(&mut self, extruder: usize) -> bool {
        if extruder == self.extruder {
            return false;
        }
        self.extruder = extruder;
        true
    }

    /// Force (or stop forcing) a retraction on every travel.
    pub fn set_always_retract(&mut self, always_retract: bool) {
        self.always_retract = always_retract;
    }

    /// Travel to `to`, retracting if always-retract is set or the travel is
    /// longer than the minimum retraction distance.
    pub fn add_travel(&mut self, to: Point2) {
        let distance = (to - self.last_position).norm();
        if distance < EPS {
            return;
        }
        let retract = self.always_retract || distance > self.travel.retraction_min_travel;
        trace!(layer = self.layer_nr, distance, retract, "travel");
        self.push_travel(to, retract);
    }

    /// Travel to `to` without considering a retraction.
    pub fn add_travel_simple(&mut self, to: Point2) {
        if (to - self.last_position).norm() < EPS {
            return;
        }
        self.push_travel(to, false);
    }

    /// Add closed paths, each starting and ending at its first vertex.
    ///
    /// With `overlap` set, each edge's flow is scaled by the multiplier the
    /// compensator reports for it.
    pub fn add_closed_path(
        &mut self,
        polygons: &[Polygon],
        config: &PathConfig,
        overlap: Option<&dyn OverlapFlow>,
    ) {
        for polygon in polygons {
            let n = polygon.points.len();
            if n < 2 {
                continue;
            }
            let edge_flows = overlap.map(|o| o.flows(polygon, config.line_width));
            let edge_flow =
                |i: usize| edge_flows.as_ref().and_then(|f| f.get(i)).copied().unwrap_or(1.0);

            let start = polygon.points[0];
            self.add_travel(start);

            let mut points = Vec::with_capacity(n);
            let mut flows = Vec::with_capacity(n);
            for k in 1..n {
                points.push(polygon.points[k]);
                flows.push(edge_flow(k - 1));
            }
            points.push(start);
            flows.push(edge_flow(n - 1));

            self.push_extrusion(config, points, flows);
            self.last_position = start;
        }
    }

    /// Add open paths in the given order and direction.
    ///
    /// With a positive `wipe` distance, each line is followed by a
    /// non-extruding move continuing its last direction.
    pub fn add_open_path(&mut self, lines: &[Polyline], config: &PathConfig, wipe: Option<f64>) {
        for line in lines {
            let [first, rest @ ..] = line.points.as_slice() else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            self.add_travel(*first);
            self.push_extrusion(config, rest.to_vec(), vec![1.0; rest.len()]);

            let end = line.points[line.points.len() - 1];
            let before = line.points[line.points.len() - 2];
            self.last_position = end;

            if let Some(distance) = wipe.filter(|d| *d > 0.0) {
                let direction = end - before;
                if direction.norm() > EPS {
                    self.add_travel_simple(end + direction.normalize() * distance);
                }
            }
        }
    }

    /// Travel and extrusion time at the current effective speeds (s).
    pub fn get_times(&self) -> (f64, f64) {
        let mut position = self.start_position;
        let mut travel_time = 0.0;
        let mut extrude_time = 0.0;
        for segment in &self.segments {
            for point in &segment.points {
                let distance = (point - position).norm();
                position = *point;
                if segment.speed <= 0.0 {
                    continue;
                }
                match segment.kind {
                    SegmentKind::Travel => travel_time += distance / segment.speed,
                    SegmentKind::Extrusion => extrude_time += distance / segment.speed,
                }
            }
        }
        (travel_time, extrude_time)
    }

    /// Slow extrusions down so the layer takes at least `min_time`.
    ///
    /// Speeds are recomputed from each config's nominal speed, never raised
    /// above it and never lowered below `min_speed` (or the nominal speed
    /// when that is already slower). Whatever time the floor prevents
    /// reaching is kept as [`LayerPlan::extra_time`].
    pub fn force_minimal_layer_time(
        &mut self,
        min_time: f64,
        min_speed: f64,
        travel_time: f64,
        extrude_time: f64,
    ) {
        for segment in &mut self.segments {
            segment.speed = segment.config.speed;
        }
        self.extra_time = 0.0;

        let total = travel_time + extrude_time;
        if total >= min_time || extrude_time <= 0.0 {
            return;
        }

        let factor = extrude_time / (min_time - travel_time).max(1.0);
        for segment in &mut self.segments {
            if segment.kind != SegmentKind::Extrusion {
                continue;
            }
            let nominal = segment.config.speed;
            segment.speed = (nominal * factor).clamp(min_speed.min(nominal), nominal);
        }

        let (travel, extrude) = self.get_times();
        let remaining = min_time - (travel + extrude);
        if remaining > EXTRA_TIME_TOLERANCE {
            self.extra_time = remaining;
        }
        trace!(
            layer = self.layer_nr,
            factor,
            extra_time = self.extra_time,
            "minimal layer time"
        );
    }

    /// Write the layer to `stream`.
    ///
    /// Tool changes are emitted right before the first segment of the new
    /// extruder. With `lift_head`, a layer that is still too short after
    /// slowing down ends with a head lift and a dwell.
    pub fn write_gcode(&self, stream: &mut dyn CommandStream, lift_head: bool, layer_height: f64) {
        let last_spiral = self
            .segments
            .iter()
            .rposition(|s| s.kind == SegmentKind::Extrusion && s.config.spiralize);
        let mut feature = None;

        for (i, segment) in self.segments.iter().enumerate() {
            if stream.extruder() != segment.extruder {
                stream.switch_extruder(segment.extruder, &segment.config.retraction);
            }

            match segment.kind {
                SegmentKind::Travel => {
                    if segment.retract {
                        stream.retract(&segment.config.retraction);
                    }
                    for point in &segment.points {
                        stream.travel(*point, segment.speed);
                    }
                }
                SegmentKind::Extrusion => {
                    if feature != Some(segment.config.feature) {
                        feature = Some(segment.config.feature);
                        stream.feature(segment.config.feature);
                    }
                    if Some(i) == last_spiral {
                        write_spiral(stream, segment, layer_height);
                        continue;
                    }
                    let next_travel = self
                        .segments
                        .get(i + 1)
                        .filter(|s| s.kind == SegmentKind::Travel);
                    if let Some(next) = next_travel {
                        if self.coasting.enabled
                            && self.write_coasted(stream, segment, next.retract)
                        {
                            continue;
                        }
                    }
                    write_extrusion(stream, segment);
                }
            }
        }

        if lift_head && self.extra_time > 0.0 {
            stream.comment("Small layer, adding delay");
            stream.retract(&self.retraction);
            let z = stream.z();
            stream.set_z(z + HEAD_LIFT);
            let here = stream.position();
            stream.travel(here, self.travel.speed);
            stream.dwell(self.extra_time);
        }
    }

    /// Write an extrusion whose tail is travelled without flow.
    ///
    /// Returns false (and writes nothing) when the path is too short to
    /// coast.
    fn write_coasted(
        &self,
        stream: &mut dyn CommandStream,
        segment: &Segment,
        retracting: bool,
    ) -> bool {
        let mm3_per_mm = segment.config.extrusion_mm3_per_mm();
        if mm3_per_mm <= 0.0 {
            return false;
        }
        let coasting = &self.coasting;
        let (volume, min_volume, speed_fraction) = if retracting {
            (
                coasting.volume_retract,
                coasting.min_volume_retract,
                coasting.speed_retract,
            )
        } else {
            (
                coasting.volume_move,
                coasting.min_volume_move,
                coasting.speed_move,
            )
        };

        let start = stream.position();
        let mut path_length = 0.0;
        let mut previous = start;
        for point in &segment.points {
            path_length += (point - previous).norm();
            previous = *point;
        }

        let path_volume = path_length * mm3_per_mm;
        let coast_volume = if min_volume > 0.0 && path_volume < min_volume {
            volume * path_volume / min_volume
        } else {
            volume
        };
        let coast_distance = coast_volume / mm3_per_mm;
        if coast_distance <= EPS || coast_distance >= path_length {
            return false;
        }

        let split_at = path_length - coast_distance;
        let mut walked = 0.0;
        let mut previous = start;
        for (k, point) in segment.points.iter().enumerate() {
            let distance = (point - previous).norm();
            if walked + distance >= split_at {
                let t = if distance > EPS {
                    (split_at - walked) / distance
                } else {
                    1.0
                };
                let split = previous + (point - previous) * t;
                stream.extrude(split, segment.speed, mm3_per_mm * segment.flows[k]);
                trace!(layer = self.layer_nr, coast_distance, retracting, "coasting");
                let coast_speed = segment.speed * speed_fraction;
                for rest in &segment.points[k..] {
                    stream.travel(*rest, coast_speed);
                }
                return true;
            }
            stream.extrude(*point, segment.speed, mm3_per_mm * segment.flows[k]);
            walked += distance;
            previous = *point;
        }
        true
    }

    fn push_travel(&mut self, to: Point2, retract: bool) {
        let config = PathConfig {
            retraction: self.retraction,
            ..self.travel_config
        };
        self.push(config, SegmentKind::Travel, vec![to], Vec::new(), retract);
        self.last_position = to;
    }

    fn push_extrusion(&mut self, config: &PathConfig, points: Vec<Point2>, flows: Vec<f64>) {
        self.retraction = config.retraction;
        self.push(*config, SegmentKind::Extrusion, points, flows, false);
    }

    fn push(
        &mut self,
        config: PathConfig,
        kind: SegmentKind,
        points: Vec<Point2>,
        flows: Vec<f64>,
        retract: bool,
    ) {
        if let Some(last) = self.segments.last_mut() {
            if last.kind == kind && last.config == config && last.extruder == self.extruder {
                last.points.extend(points);
                last.flows.extend(flows);
                last.retract |= retract;
                return;
            }
        }
        self.segments.push(Segment {
            speed: config.speed,
            config,
            kind,
            extruder: self.extruder,
            points,
            flows,
            retract,
        });
    }
}

fn write_extrusion(stream: &mut dyn CommandStream, segment: &Segment) {
    let mm3_per_mm = segment.config.extrusion_mm3_per_mm();
    for (point, flow) in segment.points.iter().zip(&segment.flows) {
        stream.extrude(*point, segment.speed, mm3_per_mm * flow);
    }
}

/// Extrude while raising Z by one layer height over the segment's length.
fn write_spiral(stream: &mut dyn CommandStream, segment: &Segment, layer_height: f64) {
    let mm3_per_mm = segment.config.extrusion_mm3_per_mm();
    let z0 = stream.z();
    let mut previous = stream.position();
    let mut total = 0.0;
    for point in &segment.points {
        total += (point - previous).norm();
        previous = *point;
    }

    let mut previous = stream.position();
    let mut length = 0.0;
    for (point, flow) in segment.points.iter().zip(&segment.flows) {
        length += (point - previous).norm();
        previous = *point;
        if total > EPS {
            stream.set_z(z0 + layer_height * length / total);
        }
        stream.extrude(*point, segment.speed, mm3_per_mm * flow);
    }
}
