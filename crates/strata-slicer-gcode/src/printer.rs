//! Printer profile definitions.

use serde::{Deserialize, Serialize};
use strata_slicer::Settings;

use crate::error::{GcodeError, Result};
use crate::flavor::GcodeFlavor;

/// Printer profile with machine-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterProfile {
    /// Identifier used to select the profile.
    pub id: String,
    /// Display name.
    pub name: String,
    /// G-code flavor.
    pub flavor: GcodeFlavor,
    /// Build volume X (mm).
    pub bed_x: f64,
    /// Build volume Y (mm).
    pub bed_y: f64,
    /// Build volume Z (mm).
    pub bed_z: f64,
    /// Is the bed heated?
    pub heated_bed: bool,
    /// Number of extruders.
    pub extruder_count: usize,
    /// Nozzle diameter (mm).
    pub nozzle_diameter: f64,
    /// Filament diameter (mm).
    pub filament_diameter: f64,
    /// Default nozzle temperature (°C).
    pub default_print_temp: u32,
    /// Default bed temperature (°C).
    pub default_bed_temp: u32,
    /// Retraction length (mm).
    pub retraction_distance: f64,
    /// Retraction speed (mm/s).
    pub retraction_speed: f64,
    /// Z lift while retracted (mm).
    pub z_hop: f64,
}

impl Default for PrinterProfile {
    fn default() -> Self {
        Self::generic()
    }
}

impl PrinterProfile {
    /// Generic single-extruder Marlin printer.
    pub fn generic() -> Self {
        Self {
            id: "generic".into(),
            name: "Generic Marlin".into(),
            flavor: GcodeFlavor::Marlin,
            bed_x: 220.0,
            bed_y: 220.0,
            bed_z: 250.0,
            heated_bed: true,
            extruder_count: 1,
            nozzle_diameter: 0.4,
            filament_diameter: 1.75,
            default_print_temp: 210,
            default_bed_temp: 60,
            retraction_distance: 4.5,
            retraction_speed: 25.0,
            z_hop: 0.0,
        }
    }

    /// Generic dual-extruder Marlin printer.
    pub fn generic_dual() -> Self {
        Self {
            id: "generic-dual".into(),
            name: "Generic Marlin (dual extruder)".into(),
            extruder_count: 2,
            bed_x: 300.0,
            ..Self::generic()
        }
    }

    /// Bambu Lab X1 Carbon profile.
    pub fn bambu_x1c() -> Self {
        Self {
            id: "bambu-x1c".into(),
            name: "Bambu Lab X1 Carbon".into(),
            flavor: GcodeFlavor::Bambu,
            bed_x: 256.0,
            bed_y: 256.0,
            bed_z: 256.0,
            default_print_temp: 220,
            default_bed_temp: 55,
            retraction_distance: 0.8,
            retraction_speed: 30.0,
            z_hop: 0.4,
            ..Self::generic()
        }
    }

    /// Creality Ender 3 profile.
    pub fn ender3() -> Self {
        Self {
            id: "ender3".into(),
            name: "Creality Ender 3".into(),
            retraction_distance: 5.0,
            retraction_speed: 45.0,
            z_hop: 0.2,
            default_print_temp: 200,
            ..Self::generic()
        }
    }

    /// Prusa MK4 profile.
    pub fn prusa_mk4() -> Self {
        Self {
            id: "prusa-mk4".into(),
            name: "Prusa MK4".into(),
            bed_x: 250.0,
            bed_y: 210.0,
            bed_z: 220.0,
            default_print_temp: 215,
            retraction_distance: 0.8,
            retraction_speed: 35.0,
            z_hop: 0.2,
            ..Self::generic()
        }
    }

    /// Voron 2.4 profile (Klipper).
    pub fn voron_24() -> Self {
        Self {
            id: "voron-24".into(),
            name: "Voron 2.4 (350mm)".into(),
            flavor: GcodeFlavor::Klipper,
            bed_x: 350.0,
            bed_y: 350.0,
            bed_z: 340.0,
            default_print_temp: 240,
            default_bed_temp: 110,
            retraction_distance: 0.5,
            retraction_speed: 30.0,
            z_hop: 0.2,
            ..Self::generic()
        }
    }

    /// Get all built-in profiles.
    pub fn all_profiles() -> Vec<Self> {
        vec![
            Self::generic(),
            Self::generic_dual(),
            Self::bambu_x1c(),
            Self::ender3(),
            Self::prusa_mk4(),
            Self::voron_24(),
        ]
    }

    /// Look up a built-in profile by id.
    pub fn by_id(id: &str) -> Result<Self> {
        Self::all_profiles()
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| GcodeError::UnknownProfile(id.to_string()))
    }

    /// Check if a position is within build volume.
    pub fn in_bounds(&self, x: f64, y: f64, z: f64) -> bool {
        x >= 0.0 && x <= self.bed_x && y >= 0.0 && y <= self.bed_y && z >= 0.0 && z <= self.bed_z
    }

    /// Fail if a job needs more extruders than the machine has.
    pub fn check_extruders(&self, used: usize) -> Result<()> {
        if used > self.extruder_count {
            return Err(GcodeError::TooManyExtruders {
                used,
                available: self.extruder_count,
            });
        }
        Ok(())
    }

    /// Start code with temperatures substituted.
    pub fn start_code(&self, print_temp: f64, bed_temp: f64) -> String {
        self.flavor
            .start_template()
            .replace("{print_temp}", &format!("{print_temp:.0}"))
            .replace("{bed_temp}", &format!("{bed_temp:.0}"))
    }

    /// Fill machine-specific settings the job left unset: start and end
    /// code, and zero temperatures and retraction.
    pub fn apply_defaults(&self, settings: &mut Settings) {
        if settings.material_print_temperature <= 0.0 {
            settings.material_print_temperature = f64::from(self.default_print_temp);
        }
        if settings.material_bed_temperature <= 0.0 && self.heated_bed {
            settings.material_bed_temperature = f64::from(self.default_bed_temp);
        }
        if settings.retraction_amount <= 0.0 {
            settings.retraction_amount = self.retraction_distance;
            settings.retraction_retract_speed = self.retraction_speed;
            settings.retraction_prime_speed = self.retraction_speed;
        }
        if settings.retraction_hop <= 0.0 {
            settings.retraction_hop = self.z_hop;
        }
        if settings.machine_start_gcode.is_empty() {
            settings.machine_start_gcode = self.start_code(
                settings.material_print_temperature,
                settings.material_bed_temperature,
            );
        }
        if settings.machine_end_gcode.is_empty() {
            settings.machine_end_gcode = self.flavor.end_template().to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles() {
        for profile in PrinterProfile::all_profiles() {
            assert!(profile.bed_x > 0.0);
            assert!(profile.bed_y > 0.0);
            assert!(profile.bed_z > 0.0);
            assert!(profile.nozzle_diameter > 0.0);
            assert!(profile.extruder_count >= 1);
        }
    }

    #[test]
    fn test_profile_ids_unique() {
        let profiles = PrinterProfile::all_profiles();
        for (i, a) in profiles.iter().enumerate() {
            assert!(profiles[i + 1..].iter().all(|b| b.id != a.id), "{}", a.id);
        }
    }

    #[test]
    fn test_by_id() {
        assert_eq!(PrinterProfile::by_id("voron-24").map(|p| p.flavor).ok(), Some(GcodeFlavor::Klipper));
        assert!(matches!(
            PrinterProfile::by_id("nope"),
            Err(GcodeError::UnknownProfile(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_in_bounds() {
        let profile = PrinterProfile::bambu_x1c();
        assert!(profile.in_bounds(100.0, 100.0, 100.0));
        assert!(!profile.in_bounds(-1.0, 100.0, 100.0));
        assert!(!profile.in_bounds(300.0, 100.0, 100.0));
    }

    #[test]
    fn test_check_extruders() {
        assert!(PrinterProfile::generic_dual().check_extruders(2).is_ok());
        assert!(matches!(
            PrinterProfile::generic().check_extruders(2),
            Err(GcodeError::TooManyExtruders { used: 2, available: 1 })
        ));
    }

    #[test]
    fn test_start_code_substitutes_temperatures() {
        let code = PrinterProfile::voron_24().start_code(245.0, 100.0);
        assert!(code.starts_with("PRINT_START BED=100 EXTRUDER=245"));
    }

    #[test]
    fn test_apply_defaults_keeps_job_values() {
        let mut settings = Settings {
            material_print_temperature: 0.0,
            machine_end_gcode: "M84\n".into(),
            ..Default::default()
        };
        PrinterProfile::ender3().apply_defaults(&mut settings);
        assert_eq!(settings.material_print_temperature, 200.0);
        assert_eq!(settings.machine_end_gcode, "M84\n");
        assert!(settings.machine_start_gcode.contains("G28"));
    }
}
