//! # General disparity objects
//!
//! This module provides the output disparity map and the algorithm trait implemented by stereo
//! matchers.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::error::*;
use crate::frame::{StereoInput, StereoOutput};
use crate::labels::{OutputLabel, DONT_CARE_LABEL, OCCLUDED_LABEL};

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// A dense disparity map holding real disparities or the occluded/don't-care sentinels.
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityMap {
    width: usize,
    height: usize,
    data: Vec<OutputLabel>,
    pub max_disp: Option<OutputLabel>,
    pub min_disp: Option<OutputLabel>,
}

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

pub trait DisparityAlgorithm {
    /// Compute the disparity maps and masks of the given stereo input.
    fn compute(&mut self, input: &StereoInput) -> Result<StereoOutput>;
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl DisparityMap {
    /// Create a map with every pixel marked as don't-care.
    pub fn new(width: usize, height: usize) -> Self {
        DisparityMap {
            width,
            height,
            data: vec![DONT_CARE_LABEL; width * height],
            min_disp: None,
            max_disp: None,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> OutputLabel {
        self.data[y * self.width + x]
    }

    /// Set a pixel, keeping the real disparity range up to date.
    pub fn put(&mut self, x: usize, y: usize, val: OutputLabel) {
        self.data[y * self.width + x] = val;

        if val != DONT_CARE_LABEL && val != OCCLUDED_LABEL {
            self.min_disp = Some(self.min_disp.map_or(val, |m| m.min(val)));
            self.max_disp = Some(self.max_disp.map_or(val, |m| m.max(val)));
        }
    }

    /// Row-major view of all labels.
    pub fn as_slice(&self) -> &[OutputLabel] {
        &self.data
    }

    pub fn is_occluded(&self, x: usize, y: usize) -> bool {
        self.get(x, y) == OCCLUDED_LABEL
    }

    pub fn is_dont_care(&self, x: usize, y: usize) -> bool {
        self.get(x, y) == DONT_CARE_LABEL
    }
}
