//! # Distance utilities
//!
//! Small numeric helpers used by the cost provider: L1, L2 and colour distortion distances over
//! pixels of 1 to 4 channels, and Hamming distances over binary descriptors.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::convert::TryFrom;
use std::ops::{Add, Div, Mul, Sub};

use crate::error::*;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Bit count of every byte value, shared read-only by all callers.
static POPCOUNT_LUT8: [u8; 256] = build_popcount_lut();

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// Pixel distance selected at runtime by `pixel_metric`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelMetric {
    L1,
    L2Sqr,
    L2,
    /// `color_mix_dist` for colour pixels, L1 for single channel ones.
    ColorMix,
}

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// Pixel channel element supported by the distance functions.
pub trait Channel: Copy + PartialEq + PartialOrd {
    /// Type distances are accumulated in.
    type Acc: Copy
        + PartialOrd
        + Add<Output = Self::Acc>
        + Sub<Output = Self::Acc>
        + Mul<Output = Self::Acc>
        + Div<Output = Self::Acc>;

    const ZERO: Self::Acc;

    fn widen(self) -> Self::Acc;
    fn abs_diff(self, other: Self) -> Self::Acc;
    fn is_positive(self) -> bool;
    fn sqrt(acc: Self::Acc) -> Self::Acc;
    fn half(acc: Self::Acc) -> Self::Acc;
    fn quadruple(acc: Self::Acc) -> Self::Acc;
    fn to_f32(acc: Self::Acc) -> f32;
}

impl Channel for u8 {
    type Acc = u64;

    const ZERO: u64 = 0;

    fn widen(self) -> u64 {
        self as u64
    }

    fn abs_diff(self, other: Self) -> u64 {
        (self as i64 - other as i64).unsigned_abs()
    }

    fn is_positive(self) -> bool {
        self > 0
    }

    fn sqrt(acc: u64) -> u64 {
        (acc as f64).sqrt() as u64
    }

    fn half(acc: u64) -> u64 {
        acc / 2
    }

    fn quadruple(acc: u64) -> u64 {
        acc * 4
    }

    fn to_f32(acc: u64) -> f32 {
        acc as f32
    }
}

impl Channel for f32 {
    type Acc = f32;

    const ZERO: f32 = 0.0;

    fn widen(self) -> f32 {
        self
    }

    fn abs_diff(self, other: Self) -> f32 {
        (self - other).abs()
    }

    fn is_positive(self) -> bool {
        self > 0.0
    }

    fn sqrt(acc: f32) -> f32 {
        acc.sqrt()
    }

    fn half(acc: f32) -> f32 {
        acc / 2.0
    }

    fn quadruple(acc: f32) -> f32 {
        acc * 4.0
    }

    fn to_f32(acc: f32) -> f32 {
        acc
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// L1 distance between two pixels.
pub fn l1_dist<T: Channel, const N: usize>(a: &[T; N], b: &[T; N]) -> T::Acc {
    a.iter()
        .zip(b.iter())
        .fold(T::ZERO, |acc, (&x, &y)| acc + x.abs_diff(y))
}

/// Squared L2 distance between two pixels.
pub fn l2_sqr_dist<T: Channel, const N: usize>(a: &[T; N], b: &[T; N]) -> T::Acc {
    a.iter().zip(b.iter()).fold(T::ZERO, |acc, (&x, &y)| {
        let d = x.abs_diff(y);
        acc + d * d
    })
}

/// L2 distance between two pixels.
pub fn l2_dist<T: Channel, const N: usize>(a: &[T; N], b: &[T; N]) -> f32 {
    T::to_f32(l2_sqr_dist(a, b)).sqrt()
}

/// Colour distortion of `curr` relative to the background colour `bg`.
///
/// This is the distance from `curr` to the line spanned by `bg` in colour space, so it ignores
/// pure intensity changes. Grey or identical pairs have no distortion; a black background
/// falls back to the summed intensity of `curr`.
pub fn color_distortion<T: Channel, const N: usize>(curr: &[T; N], bg: &[T; N]) -> T::Acc {
    debug_assert!(N > 1);

    let mut non_const = false;
    let mut non_null_dist = curr[0] != bg[0];
    let mut non_null_bg = bg[0].is_positive();
    for c in 1..N {
        non_const |= curr[c] != curr[c - 1] || bg[c] != bg[c - 1];
        non_null_dist |= curr[c] != bg[c];
        non_null_bg |= bg[c].is_positive();
    }

    if !non_const || !non_null_dist {
        return T::ZERO;
    }
    if !non_null_bg {
        return curr.iter().fold(T::ZERO, |acc, &x| acc + x.widen());
    }

    let mut curr_sqr = T::ZERO;
    let mut bg_sqr = T::ZERO;
    let mut mix = T::ZERO;
    for c in 0..N {
        curr_sqr = curr_sqr + curr[c].widen() * curr[c].widen();
        bg_sqr = bg_sqr + bg[c].widen() * bg[c].widen();
        mix = mix + curr[c].widen() * bg[c].widen();
    }

    let projected = (mix * mix) / bg_sqr;
    if curr_sqr < projected {
        T::ZERO
    } else {
        T::sqrt(curr_sqr - projected)
    }
}

/// Blend of L1 distance and colour distortion, weighted toward distortion.
pub fn color_mix_dist<T: Channel, const N: usize>(a: &[T; N], b: &[T; N]) -> T::Acc {
    T::half(l1_dist(a, b)) + T::quadruple(color_distortion(a, b))
}

/// Distance between two pixels with a runtime channel count.
///
/// Channel counts outside 1 to 4, or pixels of different lengths, are rejected.
pub fn pixel_metric<T: Channel>(metric: PixelMetric, a: &[T], b: &[T]) -> Result<f32> {
    fn eval<T: Channel, const N: usize>(metric: PixelMetric, a: &[T; N], b: &[T; N]) -> f32 {
        match metric {
            PixelMetric::L1 => T::to_f32(l1_dist(a, b)),
            PixelMetric::L2Sqr => T::to_f32(l2_sqr_dist(a, b)),
            PixelMetric::L2 => l2_dist(a, b),
            PixelMetric::ColorMix if N > 1 => T::to_f32(color_mix_dist(a, b)),
            PixelMetric::ColorMix => T::to_f32(l1_dist(a, b)),
        }
    }

    macro_rules! dispatch {
        ($n:literal) => {
            match (<&[T; $n]>::try_from(a), <&[T; $n]>::try_from(b)) {
                (Ok(a), Ok(b)) => Ok(eval(metric, a, b)),
                _ => Err(Error::Channels(a.len().max(b.len()))),
            }
        };
    }

    match a.len() {
        1 => dispatch!(1),
        2 => dispatch!(2),
        3 => dispatch!(3),
        4 => dispatch!(4),
        n => Err(Error::Channels(n)),
    }
}

/// Colour distance used by the data term, see `PixelMetric::ColorMix`.
pub fn pixel_distance<T: Channel>(a: &[T], b: &[T]) -> Result<f32> {
    pixel_metric(PixelMetric::ColorMix, a, b)
}

/// Population count of a 64-bit word using the byte lookup table.
pub fn popcount(x: u64) -> u32 {
    x.to_le_bytes()
        .iter()
        .map(|&b| POPCOUNT_LUT8[b as usize] as u32)
        .sum()
}

/// Hamming distance between two binary descriptors.
pub fn hdist(a: u64, b: u64) -> u32 {
    popcount(a ^ b)
}

/// Difference of the bit counts of two descriptors, blind to bit positions.
pub fn gdist(a: u64, b: u64) -> u32 {
    let (pa, pb) = (popcount(a), popcount(b));
    if pa > pb {
        pa - pb
    } else {
        pb - pa
    }
}

const fn build_popcount_lut() -> [u8; 256] {
    let mut lut = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        lut[i] = (i & 1) as u8 + lut[i / 2];
        i += 1;
    }
    lut
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
