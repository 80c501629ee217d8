//! Error types for raster, mask and project operations.

use thiserror::Error;

/// Errors that can occur inside the compositing engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// `combine` was called without any masks.
    #[error("No masks provided")]
    EmptyMaskSet,

    /// Two rasters that must be congruent have different sizes.
    #[error("Dimension mismatch: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        /// (width, height) of the first operand
        expected: (u32, u32),
        /// (width, height) of the offending operand
        found: (u32, u32),
    },

    /// Encoded bytes could not be turned into a pixel buffer.
    #[error("Decode failed: {reason}")]
    Decode {
        /// Human readable cause
        reason: String,
    },

    /// Encoding a raster into an image container failed.
    #[error("Encode failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No layer with this id exists in the store.
    #[error("Layer not found: {id}")]
    LayerNotFound {
        /// The id that was looked up
        id: String,
    },

    /// The layer exists but its pixels failed to decode.
    #[error("Layer '{id}' has no usable pixels")]
    LayerUnavailable {
        /// The broken layer's id
        id: String,
    },

    /// Project file structure is invalid.
    #[error("Invalid project: {message}")]
    InvalidProject {
        /// Description of the problem
        message: String,
    },

    /// Font data could not be parsed.
    #[error("Font error: {message}")]
    Font {
        /// Description of the problem
        message: String,
    },
}

impl EngineError {
    /// Shorthand for a [`EngineError::DimensionMismatch`] from two sizes.
    pub fn mismatch(expected: (u32, u32), found: (u32, u32)) -> Self {
        EngineError::DimensionMismatch { expected, found }
    }
}

/// Result alias used across the crate.
pub type EngineResult<T> = Result<T, EngineError>;
