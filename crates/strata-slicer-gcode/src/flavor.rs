//! G-code flavor definitions.

use serde::{Deserialize, Serialize};

/// G-code flavor (dialect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GcodeFlavor {
    /// Marlin firmware (Ender, Prusa).
    #[default]
    Marlin,
    /// Klipper firmware.
    Klipper,
    /// Bambu Lab printers.
    Bambu,
    /// RepRap firmware.
    RepRap,
}

impl GcodeFlavor {
    /// Name written into the file header.
    pub fn name(self) -> &'static str {
        match self {
            GcodeFlavor::Marlin => "Marlin",
            GcodeFlavor::Klipper => "Klipper",
            GcodeFlavor::Bambu => "Bambu",
            GcodeFlavor::RepRap => "RepRap",
        }
    }

    /// Start code template. `{print_temp}` and `{bed_temp}` are substituted
    /// by [`PrinterProfile::start_code`](crate::PrinterProfile::start_code).
    ///
    /// Heating happens before this template runs, so the templates only
    /// home, level and reset the extruder.
    pub fn start_template(self) -> &'static str {
        match self {
            GcodeFlavor::Marlin => {
                "G28 ; Home all axes\n\
                 G29 ; Auto bed leveling\n\
                 M82 ; Absolute extrusion\n\
                 G92 E0 ; Reset extruder\n\
                 G1 Z5 F3000 ; Move Z up\n"
            }
            GcodeFlavor::Klipper => {
                "PRINT_START BED={bed_temp} EXTRUDER={print_temp}\n\
                 M82\n\
                 G92 E0\n"
            }
            GcodeFlavor::Bambu => {
                "M400 ; Wait for moves to finish\n\
                 G28 ; Home all\n\
                 M82\n\
                 G92 E0\n\
                 G1 Z5 F3000\n"
            }
            GcodeFlavor::RepRap => {
                "G28 ; Home\n\
                 G29 ; Probe bed\n\
                 M82\n\
                 G92 E0\n"
            }
        }
    }

    /// End code template. Heaters are switched off by the job epilogue.
    pub fn end_template(self) -> &'static str {
        match self {
            GcodeFlavor::Marlin | GcodeFlavor::RepRap => {
                "G91 ; Relative positioning\n\
                 G1 Z10 F3000 ; Move Z up\n\
                 G90 ; Absolute positioning\n\
                 G1 X0 Y200 F3000 ; Present print\n\
                 M84 ; Disable motors\n"
            }
            GcodeFlavor::Klipper => "PRINT_END\n",
            GcodeFlavor::Bambu => {
                "M400 ; Wait for moves\n\
                 G91\n\
                 G1 Z10 F3000\n\
                 G90\n\
                 M84\n"
            }
        }
    }

    /// Comment lines marking the start of a layer.
    pub fn layer_comment(self, layer_nr: i64) -> String {
        match self {
            GcodeFlavor::Bambu => format!("; CHANGE_LAYER\n;LAYER:{layer_nr}\n"),
            _ => format!(";LAYER:{layer_nr}\n"),
        }
    }

    /// Command switching the part fan off.
    pub fn fan_off(self) -> &'static str {
        match self {
            GcodeFlavor::RepRap => "M106 S0",
            _ => "M107",
        }
    }
}
