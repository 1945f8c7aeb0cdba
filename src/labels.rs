//! # Label spaces
//!
//! Internal labels are compact `u8` indices. Disparity indices `0..n_real` map to real offsets,
//! followed by the occluded and don't-care sentinels. Segmentation uses the binary pair
//! background/foreground.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::convert::TryFrom;

use crate::error::*;
use crate::params::Params;

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// Compact label used inside the graph model.
pub type Label = u8;

/// Label value returned to callers.
pub type OutputLabel = i32;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Output disparity value for pixels outside the region of interest.
pub const DONT_CARE_LABEL: OutputLabel = OutputLabel::MIN;

/// Output disparity value for occluded pixels.
pub const OCCLUDED_LABEL: OutputLabel = OutputLabel::MAX;

/// Output mask value for foreground pixels.
pub const FOREGROUND_LABEL: OutputLabel = Label::MAX as OutputLabel;

/// Output mask value for background pixels.
pub const BACKGROUND_LABEL: OutputLabel = 0;

pub const BACKGROUND_IDX: Label = 0;
pub const FOREGROUND_IDX: Label = 1;

/// Number of labels in the segmentation sub-problem.
pub const SEGM_LABEL_COUNT: usize = 2;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Mapping between internal disparity indices and real disparity offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSpace {
    min_disparity: usize,
    step: usize,
    real_count: usize,
    outputs: Vec<OutputLabel>,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl LabelSpace {
    pub fn new(params: &Params) -> Result<Self> {
        params.validate()?;
        let real_count = (params.max_disparity - params.min_disparity) / params.disparity_step + 1;

        // Two sentinels must still fit after the real labels.
        if real_count + 2 > Label::MAX as usize + 1 {
            return Err(Error::Config(format!(
                "{} disparity labels exceed the internal label range",
                real_count
            )));
        }

        let mut outputs = (0..real_count)
            .map(|i| {
                let offset = params.min_disparity + i * params.disparity_step;
                OutputLabel::try_from(offset)
                    .ok()
                    .filter(|&o| o != OCCLUDED_LABEL && o != DONT_CARE_LABEL)
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "disparity {} collides with the output sentinels",
                            offset
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        outputs.push(OCCLUDED_LABEL);
        outputs.push(DONT_CARE_LABEL);

        Ok(Self {
            min_disparity: params.min_disparity,
            step: params.disparity_step,
            real_count,
            outputs,
        })
    }

    /// Number of real (non-sentinel) disparity labels.
    pub fn real_count(&self) -> usize {
        self.real_count
    }

    /// Number of labels a graph node may take: every real label plus the occluded sentinel.
    pub fn node_label_count(&self) -> usize {
        self.real_count + 1
    }

    pub fn occluded(&self) -> Label {
        self.real_count as Label
    }

    pub fn dont_care(&self) -> Label {
        (self.real_count + 1) as Label
    }

    pub fn is_real(&self, label: Label) -> bool {
        (label as usize) < self.real_count
    }

    /// Pixel offset of a real label.
    pub fn offset(&self, label: Label) -> usize {
        debug_assert!(self.is_real(label));
        self.min_disparity + label as usize * self.step
    }

    /// Translate an internal label to its output value.
    pub fn to_output(&self, label: Label) -> OutputLabel {
        self.outputs[label as usize]
    }

    /// All output labels, real disparities first, then the occluded and don't-care sentinels.
    pub fn outputs(&self) -> &[OutputLabel] {
        &self.outputs
    }

    /// Same-range check used when re-ingesting feature packets.
    pub(crate) fn signature(&self) -> (usize, usize, usize) {
        (self.min_disparity, self.step, self.real_count)
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_follow_real_labels() {
        let mut params = Params::with_disparity_range(4, 12);
        params.disparity_step = 2;
        let space = LabelSpace::new(&params).unwrap();

        assert_eq!(space.real_count(), 5);
        assert_eq!(space.outputs(), &[4, 6, 8, 10, 12, OCCLUDED_LABEL, DONT_CARE_LABEL]);
        assert_eq!(space.to_output(space.occluded()), OCCLUDED_LABEL);
        assert_eq!(space.to_output(space.dont_care()), DONT_CARE_LABEL);
        assert_eq!(space.offset(3), 10);
    }

    #[test]
    fn too_many_labels_fail() {
        let params = Params::with_disparity_range(0, 300);
        assert!(LabelSpace::new(&params).is_err());
    }

    #[test]
    fn largest_offsets_stay_clear_of_sentinels() {
        let top = OCCLUDED_LABEL as usize - 1;
        let space = LabelSpace::new(&Params::with_disparity_range(top - 2, top)).unwrap();
        assert_eq!(space.real_count(), 3);
        for &o in space.outputs()[..3].iter() {
            assert!(o != OCCLUDED_LABEL && o != DONT_CARE_LABEL && o > 0);
        }

        let wrapped = Params::with_disparity_range(1 << 31, 1 << 31);
        assert!(matches!(LabelSpace::new(&wrapped), Err(Error::Config(_))));
    }
}
