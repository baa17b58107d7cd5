//! Convergence monitoring of the servoing task

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Vector6;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Indices of the monitored task error components: x translation, z
/// translation (along the optical axis) and rotation about the camera's y
/// axis. These are the planar degrees of freedom of a forward looking camera.
pub const CONVERGENCE_ERROR_INDICES: [usize; 3] = [0, 2, 4];

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Largest absolute value of the monitored error components.
///
/// NaN if any monitored component is NaN.
pub fn monitored_error(error: &Vector6<f64>) -> f64 {
    let mut max = 0.0f64;
    for &i in CONVERGENCE_ERROR_INDICES.iter() {
        let e = error[i].abs();
        if e.is_nan() {
            return f64::NAN;
        }
        max = max.max(e);
    }
    max
}

/// True if the monitored error is strictly below `threshold`.
///
/// A NaN error never converges.
pub fn should_stop(error: &Vector6<f64>, threshold: f64) -> bool {
    monitored_error(error) < threshold
}
