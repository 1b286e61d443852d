//! G-code text output.
//!
//! [`GcodeWriter`] implements the planner's [`CommandStream`] and serializes
//! each event as it arrives. Extrusion is absolute (`M82`): the writer keeps
//! the running E value and converts extruded volume to filament length with
//! the printer's filament diameter.

use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use strata_slicer::{CommandStream, Feature, Point2, RetractionConfig};
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::flavor::GcodeFlavor;
use crate::printer::PrinterProfile;

/// Streams planner events to G-code text.
#[derive(Debug, Clone)]
pub struct GcodeWriter {
    out: String,
    flavor: GcodeFlavor,
    extruder_count: usize,
    filament_area: f64,
    position: Point2,
    z: f64,
    /// Z lift applied while retracted.
    hop: f64,
    written_z: Option<f64>,
    extruder: usize,
    e: f64,
    retracted: Option<RetractionConfig>,
    feedrate: f64,
    print_time: f64,
    /// Extruded volume per extruder (mm³).
    filament: Vec<f64>,
}

impl GcodeWriter {
    /// Create a writer for a printer. Writes the flavor header.
    pub fn new(profile: &PrinterProfile) -> Self {
        let radius = profile.filament_diameter / 2.0;
        let mut writer = Self {
            out: String::new(),
            flavor: profile.flavor,
            extruder_count: profile.extruder_count.max(1),
            filament_area: PI * radius * radius,
            position: Point2::origin(),
            z: 0.0,
            hop: 0.0,
            written_z: None,
            extruder: 0,
            e: 0.0,
            retracted: None,
            feedrate: 0.0,
            print_time: 0.0,
            filament: Vec::new(),
        };
        writer.line(&format!(";FLAVOR:{}", profile.flavor.name()));
        writer
    }

    /// G-code written so far, without the footer.
    pub fn as_str(&self) -> &str {
        &self.out
    }

    /// Filament length used by an extruder so far (mm).
    pub fn filament_length(&self, extruder: usize) -> f64 {
        self.total_filament(extruder) / self.filament_area
    }

    /// Append the statistics footer and return the complete program.
    pub fn finish(mut self) -> String {
        let used: Vec<String> = (0..self.filament.len().max(1))
            .map(|e| format!("{:.4}m", self.filament_length(e) / 1000.0))
            .collect();
        let footer = format!(
            ";TIME:{:.0}\n;Filament used: {}\n",
            self.print_time,
            used.join(", ")
        );
        self.out.push_str(&footer);
        debug!(
            time = self.print_time,
            bytes = self.out.len(),
            "G-code complete"
        );
        self.out
    }

    /// Finish and write the program to a file.
    pub fn save(self, path: &Path) -> Result<()> {
        fs::write(path, self.finish())?;
        Ok(())
    }

    fn line(&mut self, text: &str) {
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn add_filament(&mut self, volume: f64) {
        if self.filament.len() <= self.extruder {
            self.filament.resize(self.extruder + 1, 0.0);
        }
        self.filament[self.extruder] += volume;
    }

    fn z_word(&mut self) -> String {
        let z = self.z + self.hop;
        if self.written_z.is_some_and(|w| (w - z).abs() < 1e-9) {
            return String::new();
        }
        self.written_z = Some(z);
        format!(" Z{z:.3}")
    }

    fn feed_word(&mut self, speed: f64) -> String {
        let feed = speed * 60.0;
        if speed <= 0.0 || (feed - self.feedrate).abs() < 1e-9 {
            return String::new();
        }
        self.feedrate = feed;
        format!(" F{feed:.0}")
    }

    fn write_move(&mut self, code: &str, to: Point2, speed: f64, e: Option<f64>) {
        let mut cmd = format!("{code} X{:.3} Y{:.3}", to.x, to.y);
        cmd.push_str(&self.z_word());
        if let Some(e) = e {
            cmd.push_str(&format!(" E{e:.5}"));
        }
        cmd.push_str(&self.feed_word(speed));
        self.line(&cmd);

        if speed > 0.0 {
            self.print_time += (to - self.position).norm() / speed;
        }
        self.position = to;
    }

    fn prime(&mut self) {
        let Some(retraction) = self.retracted.take() else {
            return;
        };
        if self.hop > 0.0 {
            self.hop = 0.0;
            let z = self.z_word();
            self.line(&format!("G0{z}"));
        }
        let amount = retraction.amount + retraction.prime_amount;
        if amount <= 0.0 {
            return;
        }
        self.e += amount;
        self.add_filament(retraction.prime_amount * self.filament_area);
        if retraction.prime_speed > 0.0 {
            self.print_time += amount / retraction.prime_speed;
        }
        self.feedrate = retraction.prime_speed * 60.0;
        self.line(&format!("G1 F{:.0} E{:.5}", self.feedrate, self.e));
    }
}

impl CommandStream for GcodeWriter {
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
        self.z = z;
    }

    fn layer_comment(&mut self, layer_nr: i64) {
        self.out.push_str(&self.flavor.layer_comment(layer_nr));
    }

    fn feature(&mut self, feature: Feature) {
        self.line(&format!(";TYPE:{}", feature.label()));
    }

    fn comment(&mut self, text: &str) {
        self.line(&format!(";{text}"));
    }

    fn write_raw(&mut self, text: &str) {
        self.out.push_str(text);
        if !text.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn travel(&mut self, to: Point2, speed: f64) {
        self.write_move("G0", to, speed, None);
    }

    fn extrude(&mut self, to: Point2, speed: f64, mm3_per_mm: f64) {
        self.prime();
        let volume = (to - self.position).norm() * mm3_per_mm;
        self.e += volume / self.filament_area;
        self.add_filament(volume);
        self.write_move("G1", to, speed, Some(self.e));
    }

    fn retract(&mut self, retraction: &RetractionConfig) {
        if self.retracted.is_some() {
            return;
        }
        self.retracted = Some(*retraction);
        if retraction.amount > 0.0 {
            self.e -= retraction.amount;
            if retraction.speed > 0.0 {
                self.print_time += retraction.amount / retraction.speed;
            }
            self.feedrate = retraction.speed * 60.0;
            self.line(&format!("G1 F{:.0} E{:.5}", self.feedrate, self.e));
        }
        self.hop = retraction.z_hop.max(0.0);
        trace!(e = self.e, hop = self.hop, "retract");
    }

    fn switch_extruder(&mut self, extruder: usize, retraction: &RetractionConfig) {
        if extruder >= self.extruder_count {
            warn!(
                extruder,
                available = self.extruder_count,
                "tool change to an extruder the printer does not have"
            );
        }
        self.retract(retraction);
        self.line(&format!("T{extruder}"));
        self.line("G92 E0");
        self.e = 0.0;
        self.extruder = extruder;
    }

    fn set_fan(&mut self, percent: f64) {
        if percent <= 0.0 {
            self.line(self.flavor.fan_off());
        } else {
            let pwm = (percent.min(100.0) * 255.0 / 100.0).round();
            self.line(&format!("M106 S{pwm:.0}"));
        }
    }

    fn set_temperature(&mut self, extruder: usize, celsius: f64, wait: bool) {
        let code = if wait { "M109" } else { "M104" };
        if self.extruder_count > 1 {
            self.line(&format!("{code} S{celsius:.0} T{extruder}"));
        } else {
            self.line(&format!("{code} S{celsius:.0}"));
        }
    }

    fn set_bed_temperature(&mut self, celsius: f64, wait: bool) {
        let code = if wait { "M190" } else { "M140" };
        self.line(&format!("{code} S{celsius:.0}"));
    }

    fn dwell(&mut self, seconds: f64) {
        let seconds = seconds.max(0.0);
        self.print_time += seconds;
        self.line(&format!("G4 P{:.0}", seconds * 1000.0));
    }

    fn reset_extrusion(&mut self) {
        self.e = 0.0;
        self.line("G92 E0");
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

    fn writer() -> GcodeWriter {
        GcodeWriter::new(&PrinterProfile::generic())
    }

    fn area() -> f64 {
        PI * 0.875 * 0.875
    }

    #[test]
    fn test_header() {
        assert_eq!(writer().as_str(), ";FLAVOR:Marlin\n");
    }

    #[test]
    fn test_retract_hop_and_prime() {
        let retraction = RetractionConfig {
            amount: 2.0,
            prime_amount: 0.5,
            speed: 30.0,
            prime_speed: 20.0,
            z_hop: 0.4,
        };
        let mut w = writer();
        w.set_z(0.3);
        w.travel(Point2::new(10.0, 0.0), 100.0);
        w.extrude(Point2::new(20.0, 0.0), 50.0, area());
        w.retract(&retraction);
        w.retract(&retraction);
        w.travel(Point2::new(30.0, 0.0), 100.0);
        w.extrude(Point2::new(40.0, 0.0), 50.0, area());

        let expected = "\
G0 X10.000 Y0.000 Z0.300 F6000
G1 X20.000 Y0.000 E10.00000 F3000
G1 F1800 E8.00000
G0 X30.000 Y0.000 Z0.700 F6000
G0 Z0.300
G1 F1200 E10.50000
G1 X40.000 Y0.000 E20.50000 F3000
";
        assert_eq!(w.as_str().strip_prefix(";FLAVOR:Marlin\n"), Some(expected));
    }

    #[test]
    fn test_tool_change_resets_extrusion() {
        let mut w = GcodeWriter::new(&PrinterProfile::generic_dual());
        w.extrude(Point2::new(5.0, 0.0), 10.0, area());
        w.switch_extruder(1, &RetractionConfig::default());
        w.set_temperature(1, 215.0, true);
        assert_eq!(w.extruder(), 1);
        assert!(w.as_str().contains("T1\nG92 E0\nM109 S215 T1\n"));
    }

    #[test]
    fn test_fan() {
        let mut w = writer();
        w.set_fan(100.0);
        w.set_fan(50.0);
        w.set_fan(0.0);
        assert!(w.as_str().ends_with("M106 S255\nM106 S128\nM107\n"));

        let mut reprap = GcodeWriter::new(&PrinterProfile {
            flavor: GcodeFlavor::RepRap,
            ..PrinterProfile::generic()
        });
        reprap.set_fan(0.0);
        assert!(reprap.as_str().ends_with("M106 S0\n"));
    }

    #[test]
    fn test_temperatures_and_dwell() {
        let mut w = writer();
        w.set_bed_temperature(60.0, true);
        w.set_temperature(0, 0.0, false);
        w.dwell(1.5);
        assert!(w.as_str().ends_with("M190 S60\nM104 S0\nG4 P1500\n"));
        assert_relative_eq!(w.total_print_time(), 1.5);
    }

    #[test]
    fn test_layer_and_feature_comments() {
        let mut w = writer();
        w.layer_comment(-3);
        w.feature(Feature::OuterWall);
        w.write_raw("G28");
        assert!(w.as_str().ends_with(";LAYER:-3\n;TYPE:WALL-OUTER\nG28\n"));
    }

    #[test]
    fn test_footer() {
        let mut w = writer();
        w.extrude(Point2::new(100.0, 0.0), 10.0, area() * 10.0);
        assert_relative_eq!(w.filament_length(0), 1000.0, epsilon = 1e-9);
        let out = w.finish();
        assert!(out.ends_with(";TIME:10\n;Filament used: 1.0000m\n"), "{out}");
    }
}
