//! # Matcher parameters
//!
//! All tunable constants of the joint stereo/segmentation model. Every field has a default, so a
//! parameter file only needs to list the values it overrides.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::*;
use crate::labels::OCCLUDED_LABEL;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Params {
    // ---- LABEL SPACE ----
    pub min_disparity: usize,
    pub max_disparity: usize,
    pub disparity_step: usize,

    // ---- INFERENCE ----
    /// Upper bound on the number of moves (expansion) or sweeps (ICM) per stereo pass.
    pub max_move_iterations: usize,
    pub max_outer_iterations: usize,
    pub resegm_passes_per_loop: usize,
    /// Upper bound on the number of moves (expansion) or sweeps (ICM) per resegmentation pass.
    pub resegm_max_moves: usize,
    /// Alternation stops once a round changes at most this many labels.
    pub convergence_label_changes: usize,
    pub stereo_solver: SolverKind,
    pub resegm_solver: SolverKind,

    // ---- FEATURES ----
    /// Census window radius, at most 3 so that the descriptor fits a `u64`.
    pub census_radius: usize,
    pub appearance_bins: usize,

    // ---- UNARY COSTS ----
    pub unary_oob_cost: i64,
    pub unary_occluded_cost: i64,
    pub unary_max_trunc: i64,
    pub color_scale: f32,
    pub desc_scale: f32,
    pub appearance_scale: f32,
    pub unique_over_scale: f32,
    pub unique_allowed_count: u16,
    pub disp_consistency_scale: f32,

    // ---- PAIRWISE COSTS ----
    pub stereo_label_scale: i64,
    pub stereo_max_diff: i64,
    pub lblsim_max_trunc: i64,
    pub lblsim_max_occl: i64,
    pub resegm_label_scale: i64,
    pub grad_pivot: f32,
    pub grad_scale: f32,
    pub grad_pivot_mode: GradientPivot,

    // ---- HIGHER ORDER COSTS ----
    pub ho_stereo_stride: usize,
    pub ho_resegm_stride: usize,
    pub shape_dist_scale: f32,
    pub shape_dist_px_max: f32,
    pub shape_dist_interspec_scale: f32,
    pub shape_dist_init_scale: f32,
    pub fg_occlusion_cost: i64,
}

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// Move-making backend used for a sub-problem.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    Expansion,
    Icm,
}

/// Shape of the edge-aware pairwise weight above the gradient pivot.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GradientPivot {
    Exponential,
    Linear,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            min_disparity: 0,
            max_disparity: 32,
            disparity_step: 1,

            max_move_iterations: 300,
            max_outer_iterations: 4,
            resegm_passes_per_loop: 3,
            resegm_max_moves: 4,
            convergence_label_changes: 0,
            stereo_solver: SolverKind::Expansion,
            resegm_solver: SolverKind::Expansion,

            census_radius: 2,
            appearance_bins: 8,

            unary_oob_cost: 5000,
            unary_occluded_cost: 2000,
            unary_max_trunc: 10000,
            color_scale: 40.0,
            desc_scale: 100.0,
            appearance_scale: 200.0,
            unique_over_scale: 400.0,
            unique_allowed_count: 1,
            disp_consistency_scale: 400.0,

            stereo_label_scale: 100,
            stereo_max_diff: 10,
            lblsim_max_trunc: 1000,
            lblsim_max_occl: 1000,
            resegm_label_scale: 400,
            grad_pivot: 32.0,
            grad_scale: 32.0,
            grad_pivot_mode: GradientPivot::Exponential,

            ho_stereo_stride: 1,
            ho_resegm_stride: 2,
            shape_dist_scale: 400.0,
            shape_dist_px_max: 10.0,
            shape_dist_interspec_scale: 0.5,
            shape_dist_init_scale: 0.0,
            fg_occlusion_cost: 1000,
        }
    }
}

impl Params {
    /// Build parameters for the given disparity range, every other value at its default.
    pub fn with_disparity_range(min_disparity: usize, max_disparity: usize) -> Self {
        Self {
            min_disparity,
            max_disparity,
            ..Self::default()
        }
    }

    /// Load parameters from a JSON file, missing keys falling back to their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let params: Params = serde_json::from_str(&data)?;
        params.validate()?;
        Ok(params)
    }

    /// Check that the parameters describe a usable model.
    pub fn validate(&self) -> Result<()> {
        if self.disparity_step == 0 {
            return Err(Error::Config("disparity_step must be non-zero".into()));
        }
        if self.max_disparity < self.min_disparity {
            return Err(Error::Config(format!(
                "max_disparity ({}) is below min_disparity ({})",
                self.max_disparity, self.min_disparity
            )));
        }
        // Real offsets are reported as output labels and must stay below the occluded sentinel.
        if self.max_disparity >= OCCLUDED_LABEL as usize {
            return Err(Error::Config(format!(
                "max_disparity must be below {}, got {}",
                OCCLUDED_LABEL, self.max_disparity
            )));
        }
        if self.max_move_iterations == 0 || self.resegm_max_moves == 0 {
            return Err(Error::Config("move budgets must be non-zero".into()));
        }
        if self.census_radius == 0 || self.census_radius > 3 {
            return Err(Error::Config(format!(
                "census_radius must lie in 1..=3, got {}",
                self.census_radius
            )));
        }
        if self.appearance_bins < 2 || self.appearance_bins > 16 {
            return Err(Error::Config(format!(
                "appearance_bins must lie in 2..=16, got {}",
                self.appearance_bins
            )));
        }
        if self.ho_stereo_stride == 0 || self.ho_resegm_stride == 0 {
            return Err(Error::Config("higher order strides must be non-zero".into()));
        }
        if self.grad_scale <= 0.0 || self.shape_dist_px_max <= 0.0 {
            return Err(Error::Config(
                "grad_scale and shape_dist_px_max must be positive".into(),
            ));
        }
        if self.stereo_max_diff <= 0 {
            return Err(Error::Config("stereo_max_diff must be positive".into()));
        }
        let costs = [
            self.unary_oob_cost,
            self.unary_occluded_cost,
            self.unary_max_trunc,
            self.stereo_label_scale,
            self.lblsim_max_trunc,
            self.lblsim_max_occl,
            self.resegm_label_scale,
            self.fg_occlusion_cost,
        ];
        if costs.iter().any(|&c| c < 0) {
            return Err(Error::Config("cost constants must be non-negative".into()));
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let params: Params =
            serde_json::from_str(r#"{ "max_disparity": 8, "stereo_solver": "icm" }"#).unwrap();
        assert_eq!(params.max_disparity, 8);
        assert_eq!(params.stereo_solver, SolverKind::Icm);
        assert_eq!(params.unary_oob_cost, Params::default().unary_oob_cost);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let params = Params::with_disparity_range(10, 2);
        assert!(matches!(params.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn offsets_must_stay_below_occluded_sentinel() {
        let top = OCCLUDED_LABEL as usize;
        assert!(Params::with_disparity_range(top - 1, top - 1).validate().is_ok());
        assert!(matches!(
            Params::with_disparity_range(top, top).validate(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Params::with_disparity_range(usize::MAX - 1, usize::MAX - 1).validate(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn move_budgets_are_checked() {
        let params = Params {
            resegm_max_moves: 0,
            ..Params::default()
        };
        assert!(matches!(params.validate(), Err(Error::Config(_))));
    }
}
