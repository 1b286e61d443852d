//! Full jobs written through the G-code writer.

use strata_slicer::model::{Layer, Mesh, Part};
use strata_slicer::{LayerSequencer, MeshSettings, Model, NoProgress, Point2, Polygon, Settings};
use strata_slicer_gcode::{GcodeWriter, PrinterProfile};

fn square_mesh(extruder: usize, x: f64, layers: usize) -> Mesh {
    let outline = vec![Polygon::rect(Point2::new(x, 10.0), Point2::new(x + 10.0, 20.0))];
    let part = Part {
        insets: vec![outline.clone()],
        outline,
        ..Default::default()
    };
    Mesh {
        settings: MeshSettings::for_extruder(extruder),
        layers: (0..layers)
            .map(|i| Layer {
                print_z: 0.3 + 0.2 * i as f64,
                parts: vec![part.clone()],
                open_lines: Vec::new(),
            })
            .collect(),
    }
}

fn plan(profile: &PrinterProfile, model: &Model, settings: Settings) -> String {
    let mut settings = settings;
    profile.apply_defaults(&mut settings);
    let mut sequencer = LayerSequencer::new(settings);
    let mut writer = GcodeWriter::new(profile);
    let stats = sequencer.run(model, &mut writer, &mut NoProgress);
    assert!(stats.is_ok());
    sequencer.finalize(&mut writer);
    writer.finish()
}

#[test]
fn test_single_extruder_job() {
    let profile = PrinterProfile::generic();
    let model = Model {
        meshes: vec![square_mesh(0, 10.0, 3)],
        ..Default::default()
    };
    let gcode = plan(
        &profile,
        &model,
        Settings {
            infill_line_distance: 0.0,
            ..Default::default()
        },
    );

    let lines: Vec<&str> = gcode.lines().collect();
    let find = |needle: &str| lines.iter().position(|l| l.starts_with(needle));

    assert_eq!(lines.first(), Some(&";FLAVOR:Marlin"));
    // Heat, then the profile's start code, then layers
    let heat = find("M109 S210");
    let home = find("G28");
    let layer0 = find(";LAYER:0");
    assert!(heat.is_some() && heat < home && home < layer0, "{gcode}");
    assert!(find(";LAYER:2").is_some());
    assert!(find(";LAYER:3").is_none());
    assert!(find(";TYPE:WALL-OUTER").is_some());
    assert!(!gcode.contains("\nT1\n"));

    // Epilogue: fan off, end code, heaters off, footer
    let end = find("M84");
    let heater_off = lines.iter().rposition(|l| *l == "M104 S0");
    assert!(end.is_some() && end < heater_off);
    assert!(lines.contains(&"M140 S0"));
    assert!(lines.iter().any(|l| l.starts_with(";TIME:")));
    assert!(lines.last().is_some_and(|l| l.starts_with(";Filament used: ")));
}

#[test]
fn test_dual_extruder_job_switches_tools() {
    let profile = PrinterProfile::generic_dual();
    let model = Model {
        meshes: vec![square_mesh(0, 10.0, 2), square_mesh(1, 40.0, 2)],
        ..Default::default()
    };
    let gcode = plan(
        &profile,
        &model,
        Settings {
            infill_line_distance: 0.0,
            ..Default::default()
        },
    );

    assert!(gcode.contains("\nT1\nG92 E0\n"));
    assert!(gcode.contains("M109 S210 T1"));
    let footer = gcode.lines().last().unwrap_or_default();
    assert_eq!(footer.split(", ").count(), 2, "{footer}");
}
