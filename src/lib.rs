//! # Stereo Segmentation
//!
//! This crate provides joint disparity estimation and foreground/background co-segmentation for
//! rectified stereo pairs. Both heads are modelled as pixel graphs over a region of interest, and
//! the disparity and segmentation labelings are refined in alternation with move-making
//! inference.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod assoc;
pub mod cost;
mod disparity;
pub mod distance;
mod error;
pub mod features;
pub mod frame;
pub mod graph;
pub mod labels;
pub mod maxflow;
pub mod matcher;
pub mod model;
pub mod params;
pub mod resegm;
pub mod solver;
pub mod stereo;

// -----------------------------------------------------------------------------------------------
// EXPORTS
// -----------------------------------------------------------------------------------------------

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::disparity::{DisparityAlgorithm, DisparityMap};
    pub use crate::error::{Error, Result};
    pub use crate::features::FeaturePacket;
    pub use crate::frame::{
        CameraInput, CameraOutput, ColorImage, StereoInput, StereoOutput, LEFT, RIGHT,
    };
    pub use crate::labels::{
        DONT_CARE_LABEL, OCCLUDED_LABEL, FOREGROUND_LABEL, BACKGROUND_LABEL,
    };
    pub use crate::matcher::StereoSegmMatcher;
    pub use crate::params::{GradientPivot, Params, SolverKind};
}
