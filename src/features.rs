//! # Feature extraction
//!
//! Dense per-pixel features consumed by the graph model: colour samples, census descriptors,
//! gradient magnitudes and the raw data cost of every real disparity label. Features can be
//! packed, serialized and handed back to the matcher to skip recomputation.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::GrayImage;
use imageproc::gradients::sobel_gradients;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cost::{cost_cast, Cost};
use crate::distance::{hdist, pixel_distance};
use crate::error::*;
use crate::frame::{
    matched_column, other_camera, ColorImage, StereoInput, CAMERA_COUNT, LEFT, RIGHT,
};
use crate::labels::LabelSpace;
use crate::params::Params;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Name reported for the feature extractor.
pub const FEATURE_EXTRACTOR_NAME: &str = "census-color";

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Features of one camera head.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CameraFeatures {
    /// Interleaved colour samples.
    pub colors: Vec<u8>,
    pub census: Vec<u64>,
    /// Sobel gradient magnitude scaled to 0..=255.
    pub gradient: Vec<u8>,
    /// Data cost per pixel and real label (label index fastest). Entries whose match falls
    /// outside the other image are zero and never read.
    pub affinity: Vec<Cost>,
}

/// Precomputed features for both heads of a stereo pair.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FeaturePacket {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub census_radius: usize,
    /// (min disparity, step, real label count) the affinity volume was built for.
    pub label_signature: (usize, usize, usize),
    pub cameras: [CameraFeatures; CAMERA_COUNT],
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl FeaturePacket {
    /// Compute the features of a validated stereo input.
    pub fn compute(params: &Params, labels: &LabelSpace, input: &StereoInput) -> Result<Self> {
        let (width, height) = input.validate()?;
        let channels = input.heads[0].image.channels();

        let mut descs = Vec::with_capacity(CAMERA_COUNT);
        for head in input.heads.iter() {
            let luma = head.image.to_luma();
            descs.push((
                census_transform(&luma, params.census_radius),
                gradient_magnitude(&luma),
            ));
        }

        let build = |camera: usize| -> Result<CameraFeatures> {
            let other = other_camera(camera);
            let affinity = affinity_volume(
                params,
                labels,
                camera,
                (&input.heads[camera].image, &descs[camera].0),
                (&input.heads[other].image, &descs[other].0),
            )?;
            Ok(CameraFeatures {
                colors: input.heads[camera].image.as_raw().to_vec(),
                census: descs[camera].0.clone(),
                gradient: descs[camera].1.clone(),
                affinity,
            })
        };

        Ok(Self {
            width,
            height,
            channels,
            census_radius: params.census_radius,
            label_signature: labels.signature(),
            cameras: [build(LEFT)?, build(RIGHT)?],
        })
    }

    /// Serialize the packet for archiving.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Restore a packet produced by `to_bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let packet: Self = serde_json::from_slice(bytes)?;
        packet.check_lengths()?;
        Ok(packet)
    }

    /// Check that the packet was built for this image size and model configuration.
    pub fn check_compatible(
        &self,
        params: &Params,
        labels: &LabelSpace,
        width: usize,
        height: usize,
    ) -> Result<()> {
        if self.width != width || self.height != height {
            return Err(Error::FeaturePacket(format!(
                "packet is {}x{}, model expects {}x{}",
                self.width, self.height, width, height
            )));
        }
        if self.label_signature != labels.signature() {
            return Err(Error::FeaturePacket(
                "packet was built for another disparity range".into(),
            ));
        }
        if self.census_radius != params.census_radius {
            return Err(Error::FeaturePacket(
                "packet was built with another census radius".into(),
            ));
        }
        self.check_lengths()
    }

    fn check_lengths(&self) -> Result<()> {
        let px = self.width * self.height;
        let labels = self.label_signature.2;
        for cam in self.cameras.iter() {
            if cam.colors.len() != px * self.channels
                || cam.census.len() != px
                || cam.gradient.len() != px
                || cam.affinity.len() != px * labels
            {
                return Err(Error::FeaturePacket("inconsistent buffer lengths".into()));
            }
        }
        Ok(())
    }

    /// Colour samples of a pixel.
    pub fn color(&self, camera: usize, idx: usize) -> &[u8] {
        &self.cameras[camera].colors[idx * self.channels..(idx + 1) * self.channels]
    }
}

/// Census transform, one bit per neighbour darker than the centre. Borders are clamped.
pub fn census_transform(luma: &GrayImage, radius: usize) -> Vec<u64> {
    let (width, height) = (luma.width() as usize, luma.height() as usize);
    let r = radius as isize;
    let clamp = |v: isize, max: usize| v.max(0).min(max as isize - 1) as u32;

    let rows: Vec<Vec<u64>> = (0..height)
        .into_par_iter()
        .map(|y| {
            (0..width)
                .map(|x| {
                    let centre = luma.get_pixel(x as u32, y as u32)[0];
                    let mut desc = 0u64;
                    for dy in -r..=r {
                        for dx in -r..=r {
                            if dx == 0 && dy == 0 {
                                continue;
                            }
                            let nx = clamp(x as isize + dx, width);
                            let ny = clamp(y as isize + dy, height);
                            desc <<= 1;
                            if luma.get_pixel(nx, ny)[0] < centre {
                                desc |= 1;
                            }
                        }
                    }
                    desc
                })
                .collect()
        })
        .collect();

    rows.concat()
}

/// Sobel gradient magnitude, scaled so that a full-range step edge maps to 255.
pub fn gradient_magnitude(luma: &GrayImage) -> Vec<u8> {
    sobel_gradients(luma)
        .pixels()
        .map(|p| (p[0] / 4).min(255) as u8)
        .collect()
}

/// Data cost of every pixel of `camera` against each real disparity label.
fn affinity_volume(
    params: &Params,
    labels: &LabelSpace,
    camera: usize,
    own: (&ColorImage, &[u64]),
    other: (&ColorImage, &[u64]),
) -> Result<Vec<Cost>> {
    let (width, height) = (own.0.width(), own.0.height());
    let channels = own.0.channels() as f32;
    let n_labels = labels.real_count();

    let rows = (0..height)
        .into_par_iter()
        .map(|y| -> Result<Vec<Cost>> {
            let mut row = vec![0; width * n_labels];
            for x in 0..width {
                let idx = y * width + x;
                for l in 0..n_labels {
                    let offset = labels.offset(l as u8);
                    let xm = match matched_column(camera, x, offset, width) {
                        Some(xm) => xm,
                        None => continue,
                    };
                    let midx = y * width + xm;
                    let color = pixel_distance(own.0.pixel(x, y), other.0.pixel(xm, y))?;
                    let desc = hdist(own.1[idx], other.1[midx]);
                    let cost = cost_cast(params.color_scale * color / channels)
                        + cost_cast(params.desc_scale * desc as f32);
                    row[x * n_labels + l] = cost.min(params.unary_max_trunc);
                }
            }
            Ok(row)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(rows.concat())
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CameraInput;

    fn flat_input(value: u8) -> StereoInput {
        let img = GrayImage::from_pixel(6, 4, image::Luma([value]));
        let mask = GrayImage::new(6, 4);
        StereoInput::new(
            CameraInput::new(&img, mask.clone()),
            CameraInput::new(&img, mask),
        )
    }

    #[test]
    fn census_of_flat_image_is_zero() {
        let img = GrayImage::from_pixel(5, 5, image::Luma([80]));
        assert!(census_transform(&img, 2).iter().all(|&d| d == 0));
    }

    #[test]
    fn census_marks_darker_neighbours() {
        let mut img = GrayImage::from_pixel(3, 3, image::Luma([10]));
        img.put_pixel(1, 1, image::Luma([200]));
        let census = census_transform(&img, 1);
        assert_eq!(census[4], 0xff);
        assert_eq!(census[0], 0);
    }

    #[test]
    fn packet_survives_serialization() {
        let params = Params::with_disparity_range(0, 2);
        let labels = LabelSpace::new(&params).unwrap();
        let packet = FeaturePacket::compute(&params, &labels, &flat_input(50)).unwrap();

        assert_eq!(packet.cameras[0].affinity.len(), 6 * 4 * 3);
        assert!(packet.cameras[0].affinity.iter().all(|&c| c == 0));

        let restored = FeaturePacket::from_bytes(&packet.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, packet);
        assert!(restored.check_compatible(&params, &labels, 6, 4).is_ok());
        assert!(restored.check_compatible(&params, &labels, 5, 4).is_err());
    }
}
