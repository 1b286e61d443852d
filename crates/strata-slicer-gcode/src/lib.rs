#![warn(missing_docs)]

//! G-code output for the strata toolpath planner.
//!
//! [`GcodeWriter`] is a [`CommandStream`](strata_slicer::CommandStream):
//! hand it to [`LayerSequencer::run`](strata_slicer::LayerSequencer::run)
//! and it serializes every planner event for the selected printer.
//!
//! # Example
//!
//! ```
//! use strata_slicer::{LayerSequencer, Model, NoProgress, Settings};
//! use strata_slicer_gcode::{GcodeWriter, PrinterProfile};
//!
//! let profile = PrinterProfile::by_id("ender3")?;
//! let mut settings = Settings::default();
//! profile.apply_defaults(&mut settings);
//!
//! let mut sequencer = LayerSequencer::new(settings);
//! let mut writer = GcodeWriter::new(&profile);
//! let model = Model::default();
//! // An empty model is rejected before anything is written
//! assert!(sequencer.run(&model, &mut writer, &mut NoProgress).is_err());
//! sequencer.finalize(&mut writer);
//!
//! let gcode = writer.finish();
//! assert!(gcode.contains("M84"));
//! # Ok::<(), strata_slicer_gcode::GcodeError>(())
//! ```

pub mod error;
pub mod flavor;
pub mod printer;
pub mod writer;

pub use error::{GcodeError, Result};
pub use flavor::GcodeFlavor;
pub use printer::PrinterProfile;
pub use writer::GcodeWriter;
