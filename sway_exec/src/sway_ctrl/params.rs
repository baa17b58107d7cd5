//! Parameters structure for SwayCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use super::NUM_OUT_AXES;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for sway motion correction.
///
/// Any field missing from the parameter file takes its default value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {

    // ---- SERVOING ----

    /// Servo task gain (lambda), must be positive.
    pub gain: f64,

    /// Singular values below this are ignored by the interaction matrix
    /// pseudo-inverse.
    pub pinv_threshold: f64,

    /// The controller stops once the largest of the x translation, z
    /// translation and y rotation errors falls below this threshold.
    ///
    /// Units: meters or radians
    pub stop_threshold: f64,

    // ---- DISTURBANCE CORRECTION ----

    /// Fixed forward Euler step used to integrate the sway correction.
    ///
    /// Units: seconds
    pub integration_step_s: f64,

    /// Integrate with the measured cycle period instead of
    /// `integration_step_s`. This changes the numerical behaviour when the
    /// host's cycle rate varies.
    pub use_measured_dt: bool,

    // ---- SATURATION ----

    /// Half width of the blending band around each limit, as a fraction of
    /// that limit.
    pub sat_margin_ratio: f64,

    /// Added to the velocity magnitude before dividing the limit by it.
    pub sat_epsilon: f64,

    /// Velocity limits applied until the first `set_maximum_velocity`.
    ///
    /// Units: meters/second, meters/second, radians/second
    pub max_velocity: [f64; NUM_OUT_AXES],
}

impl Default for Params {
    fn default() -> Self {
        Self {
            gain: 0.6,
            pinv_threshold: 1e-6,
            stop_threshold: 0.1,
            integration_step_s: 0.005,
            use_measured_dt: false,
            sat_margin_ratio: 0.05,
            sat_epsilon: 1e-5,
            max_velocity: [0.0; NUM_OUT_AXES],
        }
    }
}
