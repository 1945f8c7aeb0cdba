//! # Stereo frames
//!
//! Input and output records for the two camera heads. Each head carries its own image and mask,
//! so there is no positional packing of left/right arrays.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::{GrayImage, RgbImage, RgbaImage};

use crate::disparity::DisparityMap;
use crate::error::*;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Number of camera heads in a stereo rig.
pub const CAMERA_COUNT: usize = 2;

/// Index of the left camera head. Its pixels match to the right image at `x - d`.
pub const LEFT: usize = 0;

/// Index of the right camera head. Its pixels match to the left image at `x + d`.
pub const RIGHT: usize = 1;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Interleaved 8-bit image with 1 to 4 channels.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorImage {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<u8>,
}

/// Image and foreground hint of one camera head.
#[derive(Debug, Clone)]
pub struct CameraInput {
    pub image: ColorImage,
    /// Initial foreground hint, non-zero pixels being foreground.
    pub mask: GrayImage,
}

/// A rectified stereo pair, left head first.
#[derive(Debug, Clone)]
pub struct StereoInput {
    pub heads: [CameraInput; CAMERA_COUNT],
}

/// Disparity map and refined mask of one camera head.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraOutput {
    pub disparity: DisparityMap,
    /// Refined foreground mask, 255 for foreground and 0 for background.
    pub mask: GrayImage,
}

/// Result of a matcher run, left head first.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoOutput {
    pub heads: [CameraOutput; CAMERA_COUNT],
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl ColorImage {
    /// Wrap raw interleaved pixel data.
    pub fn new(width: usize, height: usize, channels: usize, data: Vec<u8>) -> Result<Self> {
        if channels == 0 || channels > 4 {
            return Err(Error::Channels(channels));
        }
        let expected = width * height * channels;
        if data.len() != expected {
            return Err(Error::ImageBuffer {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Interleaved pixel data, row-major.
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Channel values of the pixel at (x, y).
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Mean of the colour channels at (x, y), ignoring alpha.
    pub fn intensity(&self, x: usize, y: usize) -> u8 {
        let px = self.pixel(x, y);
        let colour = match self.channels {
            2 => &px[..1],
            4 => &px[..3],
            _ => px,
        };
        let sum: u32 = colour.iter().map(|&c| c as u32).sum();
        (sum / colour.len() as u32) as u8
    }

    /// Grayscale version of the image.
    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            image::Luma([self.intensity(x as usize, y as usize)])
        })
    }
}

impl From<&GrayImage> for ColorImage {
    fn from(img: &GrayImage) -> Self {
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            channels: 1,
            data: img.as_raw().clone(),
        }
    }
}

impl From<&RgbImage> for ColorImage {
    fn from(img: &RgbImage) -> Self {
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            channels: 3,
            data: img.as_raw().clone(),
        }
    }
}

impl From<&RgbaImage> for ColorImage {
    fn from(img: &RgbaImage) -> Self {
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            channels: 4,
            data: img.as_raw().clone(),
        }
    }
}

impl CameraInput {
    pub fn new<I: Into<ColorImage>>(image: I, mask: GrayImage) -> Self {
        Self {
            image: image.into(),
            mask,
        }
    }
}

impl StereoInput {
    pub fn new(left: CameraInput, right: CameraInput) -> Self {
        Self {
            heads: [left, right],
        }
    }

    /// Check that both heads hold non-empty, equally sized images with matching masks.
    pub fn validate(&self) -> Result<(usize, usize)> {
        let (width, height) = (self.heads[LEFT].image.width(), self.heads[LEFT].image.height());
        for (camera, head) in self.heads.iter().enumerate() {
            if head.image.is_empty() {
                return Err(Error::Input {
                    camera,
                    reason: "image is empty".into(),
                });
            }
            if head.image.channels() == 0 || head.image.channels() > 4 {
                return Err(Error::Input {
                    camera,
                    reason: format!(
                        "unsupported channel count {}, expected 1 to 4",
                        head.image.channels()
                    ),
                });
            }
            if head.image.width() != width || head.image.height() != height {
                return Err(Error::Input {
                    camera,
                    reason: format!(
                        "image is {}x{}, expected {}x{}",
                        head.image.width(),
                        head.image.height(),
                        width,
                        height
                    ),
                });
            }
            if head.mask.width() as usize != width || head.mask.height() as usize != height {
                return Err(Error::Input {
                    camera,
                    reason: "mask size differs from image size".into(),
                });
            }
        }
        if self.heads[LEFT].image.channels() != self.heads[RIGHT].image.channels() {
            return Err(Error::Input {
                camera: RIGHT,
                reason: "channel count differs from the left image".into(),
            });
        }
        Ok((width, height))
    }
}

/// Index of the camera paired with `camera`.
pub fn other_camera(camera: usize) -> usize {
    CAMERA_COUNT - 1 - camera
}

/// Column matched by pixel `x` of `camera` at a disparity offset, if it lies inside the image.
pub fn matched_column(camera: usize, x: usize, offset: usize, width: usize) -> Option<usize> {
    if camera == LEFT {
        x.checked_sub(offset)
    } else {
        x.checked_add(offset).filter(|&xm| xm < width)
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
