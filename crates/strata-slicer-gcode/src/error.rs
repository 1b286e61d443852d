//! Error types for G-code output.

use thiserror::Error;

/// Errors raised while selecting a machine or writing G-code.
#[derive(Debug, Error)]
pub enum GcodeError {
    /// Output could not be written.
    #[error("failed to write G-code: {0}")]
    Io(#[from] std::io::Error),

    /// No built-in profile has this id.
    #[error("unknown printer profile: {0}")]
    UnknownProfile(String),

    /// The job uses more extruders than the machine has.
    #[error("job uses {used} extruders but the printer has {available}")]
    TooManyExtruders {
        /// Extruders referenced by the job.
        used: usize,
        /// Extruders on the machine.
        available: usize,
    },
}

/// Result type for G-code operations.
pub type Result<T> = std::result::Result<T, GcodeError>;
