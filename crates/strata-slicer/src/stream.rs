//! Command stream consumed by the planner.
//!
//! A [`CommandStream`] receives machine events in print order and keeps the
//! machine state (position, Z, active extruder, retraction) plus running
//! time and filament totals. [`EventLog`] records events in memory; the
//! `strata-slicer-gcode` crate serializes them to G-code.

use crate::config::{Feature, RetractionConfig};
use crate::path::Point2;

/// Sink for machine events.
pub trait CommandStream {
    /// Current XY position.
    fn position(&self) -> Point2;
    /// Current Z height.
    fn z(&self) -> f64;
    /// Active extruder.
    fn extruder(&self) -> usize;
    /// Set the Z used by the next move.
    fn set_z(&mut self, z: f64);
    /// Mark the start of a layer. Raft layers are negative.
    fn layer_comment(&mut self, layer_nr: i64);
    /// Mark the feature the following extrusions belong to.
    fn feature(&mut self, feature: Feature);
    /// Free-form comment.
    fn comment(&mut self, text: &str);
    /// Raw machine code, passed through untouched.
    fn write_raw(&mut self, text: &str);
    /// Move without extruding.
    fn travel(&mut self, to: Point2, speed: f64);
    /// Move while extruding `mm3_per_mm` of material per mm travelled.
    /// Primes first if retracted.
    fn extrude(&mut self, to: Point2, speed: f64, mm3_per_mm: f64);
    /// Retract filament unless already retracted.
    fn retract(&mut self, retraction: &RetractionConfig);
    /// Retract and switch to another extruder.
    fn switch_extruder(&mut self, extruder: usize, retraction: &RetractionConfig);
    /// Set part cooling fan speed (%).
    fn set_fan(&mut self, percent: f64);
    /// Set an extruder's temperature, optionally waiting for it.
    fn set_temperature(&mut self, extruder: usize, celsius: f64, wait: bool);
    /// Set the bed temperature, optionally waiting for it.
    fn set_bed_temperature(&mut self, celsius: f64, wait: bool);
    /// Wait in place.
    fn dwell(&mut self, seconds: f64);
    /// Reset the extrusion axis to zero.
    fn reset_extrusion(&mut self);
    /// Estimated print time so far (s).
    fn total_print_time(&self) -> f64;
    /// Material extruded so far by `extruder` (mm³).
    fn total_filament(&self, extruder: usize) -> f64;
}

/// One recorded machine event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Layer start.
    Layer(i64),
    /// Feature start.
    Feature(Feature),
    /// Comment.
    Comment(String),
    /// Raw code.
    Raw(String),
    /// Z change.
    Z(f64),
    /// Non-extruding move.
    Travel {
        /// Destination.
        to: Point2,
        /// Speed (mm/s).
        speed: f64,
    },
    /// Extruding move.
    Extrude {
        /// Destination.
        to: Point2,
        /// Speed (mm/s).
        speed: f64,
        /// Extruded volume per mm (mm³/mm).
        mm3_per_mm: f64,
    },
    /// Filament retracted.
    Retract,
    /// Filament primed after a retraction.
    Prime,
    /// Tool change.
    ToolChange(usize),
    /// Fan speed (%).
    Fan(f64),
    /// Extruder temperature.
    Temperature {
        /// Extruder.
        extruder: usize,
        /// Target (°C).
        celsius: f64,
        /// Wait until reached.
        wait: bool,
    },
    /// Bed temperature.
    BedTemperature {
        /// Target (°C).
        celsius: f64,
        /// Wait until reached.
        wait: bool,
    },
    /// Dwell (s).
    Dwell(f64),
    /// Extrusion axis reset.
    ResetExtrusion,
}

/// In-memory command stream.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: Vec<Event>,
    position: Point2,
    z: f64,
    extruder: usize,
    retracted: bool,
    print_time: f64,
    filament: Vec<f64>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            position: Point2::origin(),
            z: 0.0,
            extruder: 0,
            retracted: false,
            print_time: 0.0,
            filament: Vec::new(),
        }
    }
}

impl EventLog {
    /// Create an empty log at the origin on extruder 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded events in order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Consume the log, returning its events.
    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    fn add_filament(&mut self, volume: f64) {
        if self.filament.len() <= self.extruder {
            self.filament.resize(self.extruder + 1, 0.0);
        }
        self.filament[self.extruder] += volume;
    }
}

impl CommandStream for EventLog {
    fn position(&self) -> Point2 {
        self.position
    }

    fn z(&self) -> f64 {
        self.z
    }

    fn extruder(&self) -> usize {
        self.extruder
    }

    fn set_z(&mut self, z: f64) {
        if z != self.z {
            self.z = z;
            self.events.push(Event::Z(z));
        }
    }

    fn layer_comment(&mut self, layer_nr: i64) {
        self.events.push(Event::Layer(layer_nr));
    }

    fn feature(&mut self, feature: Feature) {
        self.events.push(Event::Feature(feature));
    }

    fn comment(&mut self, text: &str) {
        self.events.push(Event::Comment(text.to_string()));
    }

    fn write_raw(&mut self, text: &str) {
        self.events.push(Event::Raw(text.to_string()));
    }

    fn travel(&mut self, to: Point2, speed: f64) {
        if speed > 0.0 {
            self.print_time += (to - self.position).norm() / speed;
        }
        self.position = to;
        self.events.push(Event::Travel { to, speed });
    }

    fn extrude(&mut self, to: Point2, speed: f64, mm3_per_mm: f64) {
        if self.retracted {
            self.retracted = false;
            self.events.push(Event::Prime);
        }
        let distance = (to - self.position).norm();
        if speed > 0.0 {
            self.print_time += distance / speed;
        }
        self.add_filament(distance * mm3_per_mm);
        self.position = to;
        self.events.push(Event::Extrude {
            to,
            speed,
            mm3_per_mm,
        });
    }

    fn retract(&mut self, retraction: &RetractionConfig) {
        if self.retracted {
            return;
        }
        self.retracted = true;
        if retraction.speed > 0.0 {
            self.print_time += retraction.amount / retraction.speed;
        }
        self.events.push(Event::Retract);
    }

    fn switch_extruder(&mut self, extruder: usize, retraction: &RetractionConfig) {
        self.retract(retraction);
        self.extruder = extruder;
        self.events.push(Event::ToolChange(extruder));
    }

    fn set_fan(&mut self, percent: f64) {
        self.events.push(Event::Fan(percent));
    }

    fn set_temperature(&mut self, extruder: usize, celsius: f64, wait: bool) {
        self.events.push(Event::Temperature {
            extruder,
            celsius,
            wait,
        });
    }

    fn set_bed_temperature(&mut self, celsius: f64, wait: bool) {
        self.events.push(Event::BedTemperature { celsius, wait });
    }

    fn dwell(&mut self, seconds: f64) {
        self.print_time += seconds.max(0.0);
        self.events.push(Event::Dwell(seconds));
    }

    fn reset_extrusion(&mut self) {
        self.events.push(Event::ResetExtrusion);
    }

    fn total_print_time(&self) -> f64 {
        self.print_time
    }

    fn total_filament(&self, extruder: usize) -> f64 {
        self.filament.get(extruder).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_totals() {
        let mut log = EventLog::new();
        log.travel(Point2::new(10.0, 0.0), 100.0);
        log.extrude(Point2::new(10.0, 20.0), 20.0, 0.08);
        assert_relative_eq!(log.total_print_time(), 1.1);
        assert_relative_eq!(log.total_filament(0), 1.6);
        assert_relative_eq!(log.total_filament(1), 0.0);
    }

    #[test]
    fn test_prime_after_retract() {
        let mut log = EventLog::new();
        let retraction = RetractionConfig {
            amount: 1.0,
            speed: 10.0,
            ..Default::default()
        };
        log.retract(&retraction);
        log.retract(&retraction);
        log.extrude(Point2::new(1.0, 0.0), 10.0, 0.1);
        assert_eq!(
            &log.events()[..2],
            &[Event::Retract, Event::Prime][..]
        );
        assert_eq!(
            log.events()
                .iter()
                .filter(|e| matches!(e, Event::Retract))
                .count(),
            1
        );
    }

    #[test]
    fn test_switch_extruder_tracks_filament_separately() {
        let mut log = EventLog::new();
        log.extrude(Point2::new(1.0, 0.0), 10.0, 1.0);
        log.switch_extruder(1, &RetractionConfig::default());
        log.extrude(Point2::new(3.0, 0.0), 10.0, 1.0);
        assert_eq!(log.extruder(), 1);
        assert_relative_eq!(log.total_filament(0), 1.0);
        assert_relative_eq!(log.total_filament(1), 2.0);
    }
}
