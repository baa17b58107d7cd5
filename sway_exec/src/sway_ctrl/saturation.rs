//! # Velocity saturation
//!
//! Bounds the planar velocity demand (x, y, yaw rate) against per-axis
//! limits. A single factor scales the whole vector so its direction is
//! preserved.
//!
//! Near each limit a band of half width `margin_ratio * limit` blends the
//! unscaled and the clamped velocity linearly, so the output does not jump
//! when an axis crosses its limit.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector3;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Shared scale factor saturator with a blending band around each limit.
#[derive(Debug, Clone, Copy)]
pub struct VelocitySaturator {
    /// Half width of the blending band as a fraction of the limit.
    pub margin_ratio: f64,

    /// Added to the velocity magnitude before dividing by it.
    pub epsilon: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for VelocitySaturator {
    fn default() -> Self {
        Self {
            margin_ratio: 0.05,
            epsilon: 1e-5,
        }
    }
}

impl VelocitySaturator {
    pub fn new(margin_ratio: f64, epsilon: f64) -> Self {
        Self {
            margin_ratio,
            epsilon,
        }
    }

    /// Compute the factor the whole velocity is scaled by.
    pub fn scale_factor(&self, velocity: &Vector3<f64>, limits: &Vector3<f64>) -> f64 {
        let mut fac = 1.0f64;

        for i in 0..3 {
            let a = velocity[i].abs();
            let margin = self.margin_ratio * limits[i];
            let lower = limits[i] - margin;
            let upper = limits[i] + margin;

            fac = fac.abs().min(limits[i] / (a + self.epsilon));

            // Blending band. The denominator vanishes for a zero limit or a
            // zero velocity, in which case the hard candidate already holds.
            let den = 2.0 * margin * a;
            if a >= lower && a <= upper && den > 0.0 {
                let new_fac = ((a - lower) * limits[i] + (upper - a) * lower) / den;
                fac = fac.abs().min(new_fac.abs());
            }
        }

        fac
    }

    /// Saturate `velocity` against `limits`.
    pub fn saturate(&self, velocity: &Vector3<f64>, limits: &Vector3<f64>) -> Vector3<f64> {
        velocity * self.scale_factor(velocity, limits)
    }
}
