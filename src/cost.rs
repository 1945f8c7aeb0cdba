//! # Cost arithmetic
//!
//! Energies are accumulated in fixed-point integers. Floating values are converted exactly once,
//! when a cost table is built, using round half away from zero.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::params::{GradientPivot, Params};

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// Scalar energy contribution.
pub type Cost = i64;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Edge weights are stored in thousandths.
pub const WEIGHT_ONE: Cost = 1000;

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Convert a floating cost to fixed point. Non-finite values clamp to the representable range.
pub fn cost_cast(val: f32) -> Cost {
    if val.is_nan() {
        0
    } else {
        val.round() as Cost
    }
}

/// Apply a per-mille edge weight to a base pairwise cost.
pub fn weighted(base: Cost, weight: Cost) -> Cost {
    (base * weight + WEIGHT_ONE / 2) / WEIGHT_ONE
}

/// Edge-aware pairwise weight for a local gradient magnitude, in thousandths.
///
/// The weight is one up to the gradient pivot and decays above it.
pub fn gradient_weight(params: &Params, gradient: u8) -> Cost {
    let excess = gradient as f32 - params.grad_pivot;
    if excess <= 0.0 {
        return WEIGHT_ONE;
    }
    let w = match params.grad_pivot_mode {
        GradientPivot::Exponential => (-excess / params.grad_scale).exp(),
        GradientPivot::Linear => (1.0 - excess / (params.grad_scale * 4.0)).max(0.0),
    };
    cost_cast(w * WEIGHT_ONE as f32)
}

/// Total uniqueness penalty of a pixel matched by `count` pixels of the other view.
///
/// Counts up to the allowed value are free; each extra match costs more than the previous one.
pub fn uniqueness_penalty(params: &Params, count: u16) -> Cost {
    let allowed = params.unique_allowed_count;
    if count <= allowed {
        return 0;
    }
    ((allowed + 1)..=count)
        .map(|n| cost_cast(params.unique_over_scale * (n as f32 * 3.0) / (n as f32 + 2.0)))
        .sum()
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_weight_decays_above_pivot() {
        let params = Params::default();
        assert_eq!(gradient_weight(&params, 0), WEIGHT_ONE);
        assert_eq!(gradient_weight(&params, 32), WEIGHT_ONE);
        let high = gradient_weight(&params, 200);
        assert!(high < gradient_weight(&params, 64));
        assert!(high >= 0);

        let linear = Params {
            grad_pivot_mode: GradientPivot::Linear,
            ..Params::default()
        };
        assert_eq!(gradient_weight(&linear, 255), 0);
    }

    #[test]
    fn uniqueness_penalty_is_convex() {
        let params = Params::default();
        assert_eq!(uniqueness_penalty(&params, 0), 0);
        assert_eq!(uniqueness_penalty(&params, 1), 0);
        let p2 = uniqueness_penalty(&params, 2);
        let p3 = uniqueness_penalty(&params, 3);
        assert_eq!(p2, 600);
        assert!(p3 - p2 > p2);
    }

    #[test]
    fn weighting_rounds_half_up() {
        assert_eq!(weighted(100, WEIGHT_ONE), 100);
        assert_eq!(weighted(3, 500), 2);
        assert_eq!(weighted(0, 700), 0);
    }
}
