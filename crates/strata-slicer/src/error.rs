//! Error types for the toolpath planner.

use thiserror::Error;

use crate::infill::FillPattern;

/// Errors that can occur while planning a print job.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SlicerError {
    /// Invalid job settings.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// A fill pattern name that is not part of the known set.
    #[error("unknown fill pattern: {0}")]
    UnknownFillPattern(String),

    /// A known fill pattern used for a feature that has no strategy for it.
    #[error("{feature} cannot be filled with the {pattern:?} pattern")]
    UnsupportedPattern {
        /// Feature being filled (skin, support, ...).
        feature: &'static str,
        /// Pattern that was requested.
        pattern: FillPattern,
    },

    /// The model contains no meshes or no layers.
    #[error("model is empty")]
    EmptyModel,

    /// A mesh does not have the same number of layers as the first mesh.
    #[error("mesh {mesh} has {found} layers, expected {expected}")]
    LayerCountMismatch {
        /// Index of the offending mesh.
        mesh: usize,
        /// Layer count of mesh 0.
        expected: usize,
        /// Layer count of the offending mesh.
        found: usize,
    },
}

/// Result type for planner operations.
pub type Result<T> = std::result::Result<T, SlicerError>;
