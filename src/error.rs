//! # Error standards
//!
//! This module provides a standardised error enum and result type for this crate.

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// Standard result type used in the stereo-segm crate.
pub type Result<T> = std::result::Result<T, Error>;

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid region of interest for camera {camera}: {reason}")]
    Roi { camera: usize, reason: String },

    #[error("Invalid input for camera {camera}: {reason}")]
    Input { camera: usize, reason: String },

    #[error("Unsupported channel count {0}, expected 1 to 4")]
    Channels(usize),

    #[error("Image buffer holds {actual} bytes, expected {expected}")]
    ImageBuffer { expected: usize, actual: usize },

    #[error("The matcher must be initialized with ROIs before calling {0}")]
    NotInitialized(&'static str),

    #[error("Feature packet rejected: {0}")]
    FeaturePacket(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
