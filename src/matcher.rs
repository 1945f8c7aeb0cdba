//! # Stereo segmentation matcher
//!
//! Public handle over the joint disparity and foreground/background estimation. The graph model
//! is owned exclusively by the matcher and never exposed, so callers only deal with images,
//! masks, parameters and feature packets.
//!
//! Typical use:
//!
//! ```no_run
//! use stereo_segm::prelude::*;
//! # fn main() -> stereo_segm::Result<()> {
//! # let (roi_left, roi_right, input): (image::GrayImage, image::GrayImage, StereoInput) = unimplemented!();
//! let mut matcher = StereoSegmMatcher::new(Params::with_disparity_range(0, 16))?;
//! matcher.initialize(&[roi_left, roi_right], LEFT)?;
//! let output = matcher.apply(&input)?;
//! # Ok(())
//! # }
//! ```

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::GrayImage;
use log::{debug, warn};

use crate::disparity::DisparityAlgorithm;
use crate::error::*;
use crate::features::{FeaturePacket, FEATURE_EXTRACTOR_NAME};
use crate::frame::{StereoInput, StereoOutput};
use crate::labels::LabelSpace;
use crate::model::{GraphModelData, RunReport};
use crate::params::Params;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

pub struct StereoSegmMatcher {
    params: Params,
    labels: LabelSpace,
    model: Option<Box<GraphModelData>>,
    next_features: Option<FeaturePacket>,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl StereoSegmMatcher {
    /// Create a matcher with the given parameters. It must be initialized with ROIs before use.
    pub fn new(params: Params) -> Result<Self> {
        params.validate()?;
        let labels = LabelSpace::new(&params)?;
        Ok(Self {
            params,
            labels,
            model: None,
            next_features: None,
        })
    }

    /// Build the graph models for one ROI mask per camera. Any previous model is dropped first,
    /// also when building the new one fails.
    pub fn initialize(&mut self, rois: &[GrayImage], primary: usize) -> Result<()> {
        self.model = None;
        self.next_features = None;
        let model = GraphModelData::new(&self.params, &self.labels, rois, primary)?;
        self.model = Some(Box::new(model));
        Ok(())
    }

    /// Estimate disparity maps and refined masks for both heads.
    pub fn apply(&mut self, input: &StereoInput) -> Result<StereoOutput> {
        let model = self
            .model
            .as_mut()
            .ok_or(Error::NotInitialized("apply"))?;

        let (width, height) = input.validate()?;

        let feats = match self.next_features.take() {
            Some(packet) => {
                match packet.check_compatible(&self.params, &self.labels, width, height) {
                    Ok(()) => {
                        debug!("Using precomputed {} features", FEATURE_EXTRACTOR_NAME);
                        packet
                    }
                    Err(e) => {
                        warn!("Ignoring precomputed features: {}", e);
                        FeaturePacket::compute(&self.params, &self.labels, input)?
                    }
                }
            }
            None => FeaturePacket::compute(&self.params, &self.labels, input)?,
        };

        model.apply(&self.params, &self.labels, &feats, input)
    }

    /// Compute the feature packet `apply` would use for this input, without running inference.
    pub fn calc_features(&self, input: &StereoInput) -> Result<FeaturePacket> {
        FeaturePacket::compute(&self.params, &self.labels, input)
    }

    /// Provide the features of the next `apply` call. The packet is consumed by that call.
    pub fn set_next_features(&mut self, packet: FeaturePacket) {
        self.next_features = Some(packet);
    }

    pub fn feature_extractor_name(&self) -> &'static str {
        FEATURE_EXTRACTOR_NAME
    }

    /// Number of internal disparity labels, sentinels included.
    pub fn max_label_count(&self) -> usize {
        self.labels.real_count() + 2
    }

    pub fn labels(&self) -> &LabelSpace {
        &self.labels
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Per-pixel match counts of the other view held by `camera`'s association table.
    pub fn association_counts(&self, camera: usize) -> Result<&[u16]> {
        let model = self
            .model
            .as_ref()
            .ok_or(Error::NotInitialized("association_counts"))?;
        if camera >= crate::frame::CAMERA_COUNT {
            return Err(Error::Config(format!("no camera {}", camera)));
        }
        Ok(model.graph(camera).assoc.counts())
    }

    /// Report of the last successful `apply`.
    pub fn last_report(&self) -> Option<&RunReport> {
        self.model.as_ref().and_then(|m| m.last_report())
    }
}

impl DisparityAlgorithm for StereoSegmMatcher {
    fn compute(&mut self, input: &StereoInput) -> Result<StereoOutput> {
        self.apply(input)
    }
}
