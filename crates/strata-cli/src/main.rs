//! strata CLI - plans FFF toolpaths from pre-sliced layer data and writes
//! G-code.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use strata_slicer::model::{Layer, Mesh, Part, SkinPart};
use strata_slicer::path::bounds;
use strata_slicer::{
    JobStats, LayerSequencer, MeshSettings, Model, Point2, Polygon, Settings, Stage,
};
use strata_slicer_gcode::{GcodeWriter, PrinterProfile};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Layer toolpath planner for FFF 3D printers", long_about = None)]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a job file and write G-code
    Plan {
        /// Job file (.json or .toml) holding `settings` and `model`
        job: PathBuf,
        /// Output file (default: job path with a .gcode extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Printer profile id (see `strata profiles`)
        #[arg(long, default_value = "generic")]
        profile: String,
        /// Print job statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// List built-in printer profiles
    Profiles,
    /// Write a sample job: two stacked squares
    Demo {
        /// Output job file (.json or .toml)
        output: PathBuf,
        /// Print the upper square with the second extruder
        #[arg(long)]
        dual: bool,
    },
}

/// A job file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Job {
    settings: Settings,
    model: Model,
}

impl Job {
    /// Number of extruders the job refers to.
    fn extruder_count(&self) -> usize {
        let meshes = self.model.meshes.iter().map(|m| m.settings.extruder_nr);
        let support = [
            self.settings.support_extruder_nr,
            self.settings.support_extruder_nr_layer_1,
        ]
        .into_iter()
        .flatten();
        meshes.chain(support).max().map_or(1, |e| e + 1)
    }

    /// XY bounds of every part outline in the model.
    fn footprint(&self) -> Option<(Point2, Point2)> {
        let outlines: Vec<Polygon> = self
            .model
            .meshes
            .iter()
            .flat_map(|mesh| &mesh.layers)
            .flat_map(|layer| &layer.parts)
            .flat_map(|part| part.outline.iter().cloned())
            .collect();
        bounds(&outlines)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Toml,
}

impl Format {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Format::Toml,
            _ => Format::Json,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Plan {
            job,
            output,
            profile,
            json,
        } => {
            let output = output.unwrap_or_else(|| job.with_extension("gcode"));
            plan_job(&job, &output, &profile, json)?;
        }
        Commands::Profiles => list_profiles(),
        Commands::Demo { output, dual } => write_demo(&output, dual)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn parse_job(text: &str, format: Format) -> Result<Job> {
    let job = match format {
        Format::Json => serde_json::from_str(text).context("invalid JSON job")?,
        Format::Toml => toml::from_str(text).context("invalid TOML job")?,
    };
    Ok(job)
}

fn load_job(path: &Path) -> Result<Job> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read job file {}", path.display()))?;
    parse_job(&text, Format::of(path)).with_context(|| format!("failed to parse {}", path.display()))
}

fn plan_job(job_path: &Path, output: &Path, profile_id: &str, json: bool) -> Result<()> {
    let profile = PrinterProfile::by_id(profile_id)?;
    let mut job = load_job(job_path)?;
    profile.check_extruders(job.extruder_count())?;
    profile.apply_defaults(&mut job.settings);
    if let Some((min, max)) = job.footprint() {
        let top = job.model.layer_count().checked_sub(1).map_or(0.0, |l| job.model.print_z(l));
        if !profile.in_bounds(min.x, min.y, 0.0) || !profile.in_bounds(max.x, max.y, top) {
            warn!(profile = %profile.id, "model extends beyond the build volume");
        }
    }
    info!(profile = %profile.name, job = %job_path.display(), "loaded job");

    let mut sequencer = LayerSequencer::new(job.settings);
    let mut writer = GcodeWriter::new(&profile);
    let mut step = 0;
    let mut progress = |stage: Stage, done: usize, total: usize| match stage {
        Stage::Export => {
            let percent = done * 100 / total.max(1);
            if percent >= step {
                debug!(layer = done, total, "{percent}%");
                step = percent + 10;
            }
        }
        Stage::Finish => debug!("layers done"),
    };
    let stats = sequencer
        .run(&job.model, &mut writer, &mut progress)
        .context("planning failed")?;
    sequencer.finalize(&mut writer);

    writer
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print_stats(&stats, &profile, output);
    }
    Ok(())
}

fn print_stats(stats: &JobStats, profile: &PrinterProfile, output: &Path) {
    let radius = profile.filament_diameter / 2.0;
    let area = std::f64::consts::PI * radius * radius;
    let seconds = stats.total_time.round() as u64;

    println!("Wrote {}", output.display());
    println!("  Layers: {}", stats.layer_count);
    println!("  Height: {:.2} mm", stats.max_height);
    println!(
        "  Print time: {}h {:02}m {:02}s",
        seconds / 3600,
        seconds / 60 % 60,
        seconds % 60
    );
    for (extruder, volume) in stats.filament_per_extruder.iter().enumerate() {
        println!(
            "  Filament T{}: {:.2} m ({:.1} mm³)",
            extruder,
            volume / area / 1000.0,
            volume
        );
    }
}

fn list_profiles() {
    for profile in PrinterProfile::all_profiles() {
        println!(
            "{:<14} {} ({:?}, {:.0}x{:.0}x{:.0} mm, {} extruder{})",
            profile.id,
            profile.name,
            profile.flavor,
            profile.bed_x,
            profile.bed_y,
            profile.bed_z,
            profile.extruder_count,
            if profile.extruder_count == 1 { "" } else { "s" }
        );
    }
}

fn write_demo(output: &Path, dual: bool) -> Result<()> {
    let job = demo_job(dual);
    let text = match Format::of(output) {
        Format::Json => serde_json::to_string_pretty(&job)?,
        Format::Toml => toml::to_string_pretty(&job).context("failed to encode TOML")?,
    };
    fs::write(output, text).with_context(|| format!("failed to write {}", output.display()))?;
    println!("Wrote demo job to {}", output.display());
    if dual {
        println!("Plan it with: strata plan {} --profile generic-dual", output.display());
    }
    Ok(())
}

const DEMO_LAYERS: usize = 40;
const DEMO_SPLIT: usize = 25;
const DEMO_SHELL: usize = 3;

fn square(min: f64, max: f64) -> Vec<Polygon> {
    vec![Polygon::rect(Point2::new(min, min), Point2::new(max, max))]
}

/// One layer of a square island spanning `min..max`, with two walls and
/// either skin or sparse infill inside.
fn demo_part(min: f64, max: f64, solid: bool) -> Part {
    let inside = square(min + 0.8, max - 0.8);
    let mut part = Part {
        outline: square(min, max),
        insets: vec![square(min + 0.2, max - 0.2), square(min + 0.6, max - 0.6)],
        ..Default::default()
    };
    if solid {
        part.skin_parts.push(SkinPart {
            outline: inside,
            ..Default::default()
        });
    } else {
        part.sparse_outline.push(inside);
    }
    part
}

/// A square occupying `layers` of the job.
fn demo_mesh(extruder: usize, min: f64, max: f64, layers: std::ops::Range<usize>) -> Mesh {
    let first = layers.start;
    let last = layers.end.saturating_sub(1);
    Mesh {
        settings: MeshSettings::for_extruder(extruder),
        layers: (0..DEMO_LAYERS)
            .map(|i| Layer {
                print_z: 0.3 + 0.2 * i as f64,
                parts: if layers.contains(&i) {
                    let solid = i < first + DEMO_SHELL || i + DEMO_SHELL > last;
                    vec![demo_part(min, max, solid)]
                } else {
                    Vec::new()
                },
                open_lines: Vec::new(),
            })
            .collect(),
    }
}

fn demo_job(dual: bool) -> Job {
    let mut settings = Settings {
        layer_height: 0.2,
        layer_height_0: 0.3,
        top_layers: DEMO_SHELL,
        bottom_layers: DEMO_SHELL,
        ..Default::default()
    };
    let mut model = Model {
        meshes: vec![
            demo_mesh(0, 10.0, 30.0, 0..DEMO_SPLIT),
            demo_mesh(usize::from(dual), 15.0, 25.0, DEMO_SPLIT..DEMO_LAYERS),
        ],
        ..Default::default()
    };
    if dual {
        settings.wipe_tower_size = 5.0;
        model.wipe_tower = vec![Polygon::rect(Point2::new(40.0, 10.0), Point2::new(45.0, 15.0))];
        model.wipe_point = Point2::new(42.5, 18.0);
    }
    Job { settings, model }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_slicer::{Event, EventLog, Feature, FillPattern, NoProgress};

    #[test]
    fn test_demo_job_plans() {
        for dual in [false, true] {
            let job = demo_job(dual);
            assert_eq!(job.extruder_count(), if dual { 2 } else { 1 });
            let mut sequencer = LayerSequencer::new(job.settings);
            let stats = sequencer.run(&job.model, &mut EventLog::new(), &mut NoProgress);
            assert_eq!(stats.map(|s| s.layer_count).ok(), Some(DEMO_LAYERS));
        }
    }

    #[test]
    fn test_demo_job_survives_json() {
        let text = serde_json::to_string(&demo_job(true)).unwrap();
        let job = parse_job(&text, Format::Json).unwrap();
        assert_eq!(job.model.meshes.len(), 2);
        assert_eq!(job.model.meshes[1].settings.extruder_nr, 1);
        assert_eq!(job.settings.wipe_tower_size, 5.0);
    }

    #[test]
    fn test_parse_toml_defaults_missing_sections() {
        let job = parse_job("[settings]\nlayer_height = 0.15\n", Format::Toml).unwrap();
        assert_eq!(job.settings.layer_height, 0.15);
        assert!(job.model.meshes.is_empty());
    }

    #[test]
    fn test_unknown_fill_pattern_still_plans() {
        let job = parse_job("[settings]\nfill_pattern = \"honeycomb\"\n", Format::Toml).unwrap();
        assert_eq!(job.settings.fill_pattern, FillPattern::Unknown("honeycomb".into()));

        let demo = demo_job(false);
        let mut sequencer = LayerSequencer::new(job.settings);
        let mut log = EventLog::new();
        let stats = sequencer.run(&demo.model, &mut log, &mut NoProgress);
        assert_eq!(stats.map(|s| s.layer_count).ok(), Some(DEMO_LAYERS));
        assert!(!log
            .events()
            .iter()
            .any(|e| matches!(e, Event::Feature(Feature::Infill(_)))));
    }

    #[test]
    fn test_invalid_job_reports_format() {
        let err = parse_job("{ not json", Format::Json).unwrap_err();
        assert!(err.to_string().contains("invalid JSON job"));
    }

    #[test]
    fn test_demo_fits_every_bed() {
        let (min, max) = demo_job(false).footprint().unwrap();
        assert_eq!((min.x, max.x), (10.0, 30.0));
        for profile in PrinterProfile::all_profiles() {
            assert!(profile.in_bounds(max.x, max.y, 10.0), "{}", profile.id);
        }
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(Format::of(Path::new("job.TOML")), Format::Toml);
        assert_eq!(Format::of(Path::new("job.json")), Format::Json);
        assert_eq!(Format::of(Path::new("job")), Format::Json);
    }

    #[test]
    fn test_cli_parses_plan() {
        let cli = Cli::parse_from(["strata", "plan", "job.json", "-o", "out.gcode", "-v"]);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Plan { ref profile, output: Some(_), .. } if profile == "generic"
        ));
    }
}
