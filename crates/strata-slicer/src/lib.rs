#![warn(missing_docs)]

//! Layer toolpath planning for FFF 3D printers.
//!
//! This crate takes an already sliced model (per-layer islands with their
//! walls, skin regions and sparse infill regions) and turns it into an
//! ordered stream of machine commands: travels, extrusions, retractions,
//! tool changes, fan and temperature changes.
//!
//! # Example
//!
//! ```
//! use strata_slicer::model::{Layer, Mesh, Model, Part};
//! use strata_slicer::{EventLog, LayerSequencer, MeshSettings, NoProgress, Point2, Polygon, Settings};
//!
//! let square = vec![Polygon::rect(Point2::new(0.0, 0.0), Point2::new(20.0, 20.0))];
//! let part = Part {
//!     outline: square.clone(),
//!     insets: vec![square],
//!     ..Default::default()
//! };
//! let model = Model {
//!     meshes: vec![Mesh {
//!         settings: MeshSettings::default(),
//!         layers: vec![Layer { print_z: 0.3, parts: vec![part], open_lines: Vec::new() }],
//!     }],
//!     ..Default::default()
//! };
//!
//! let mut sequencer = LayerSequencer::new(Settings::default());
//! let mut log = EventLog::new();
//! let stats = sequencer.run(&model, &mut log, &mut NoProgress)?;
//! assert_eq!(stats.layer_count, 1);
//! # Ok::<(), strata_slicer::SlicerError>(())
//! ```

pub mod config;
pub mod cooling;
pub mod error;
pub mod infill;
pub mod model;
pub mod order;
pub mod overlap;
pub mod path;
pub mod perimeter;
pub mod planner;
pub mod progress;
pub mod sequencer;
pub mod settings;
pub mod skin;
pub mod stream;
pub mod support;
pub mod wipe_tower;

pub use config::{CoastingConfig, Feature, LayerConfigs, PathConfig, RetractionConfig, TravelConfig};
pub use error::{Result, SlicerError};
pub use infill::{FillGenerator, FillParams, FillPattern, ScanlineFill};
pub use model::Model;
pub use order::PathOrderOptimizer;
pub use overlap::{OverlapFlow, ProximityOverlap};
pub use path::{Point2, Polygon, Polyline};
pub use planner::LayerPlan;
pub use progress::{NoProgress, Progress, Stage};
pub use sequencer::{JobStats, LayerSequencer};
pub use settings::{AdhesionType, GapFill, MeshSettings, Settings};
pub use skin::{BridgeDetector, OverhangBridge};
pub use stream::{CommandStream, Event, EventLog};
