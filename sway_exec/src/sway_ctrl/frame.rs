//! Velocity frame transformation from the camera to the waist

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Matrix4, Vector6};
use util::maths::{homogeneous_inverse, velocity_twist_matrix};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Express a twist of the sensor frame in the base frame, given both frames'
/// poses in a common world frame.
///
/// `baseMsensor = wMbase^-1 * wMsensor`, and the twist is mapped by the
/// velocity twist matrix of `baseMsensor`.
pub fn to_base_frame(
    w_m_base: &Matrix4<f64>,
    w_m_sensor: &Matrix4<f64>,
    velocity_sensor: &Vector6<f64>
) -> Vector6<f64> {
    let base_m_sensor = homogeneous_inverse(w_m_base) * w_m_sensor;
    velocity_twist_matrix(&base_m_sensor) * velocity_sensor
}
