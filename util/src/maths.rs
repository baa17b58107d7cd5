//! Utility maths functions
//!
//! Rigid body helpers for 4x4 homogeneous transforms and 6-DOF velocity
//! twists. Twists are ordered `[vx, vy, vz, wx, wy, wz]`, linear part first.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::{Matrix3, Matrix4, Matrix6, Rotation3, UnitQuaternion, Vector3};
use num_traits::Float;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Below this magnitude `sinc` uses its Taylor expansion.
const SINC_TAYLOR_THRESHOLD: f64 = 1e-8;

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Unnormalised cardinal sine, `sin(x)/x`, finite at zero.
pub fn sinc<T>(x: T) -> T
where
    T: Float
{
    if x.abs() < T::from(SINC_TAYLOR_THRESHOLD).unwrap_or_else(T::epsilon) {
        T::one() - x * x / T::from(6.0).unwrap_or_else(T::one)
    }
    else {
        x.sin() / x
    }
}

/// Skew symmetric (cross product) matrix of a vector, so that
/// `skew(a) * b == a.cross(&b)`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v[2], v[1],
        v[2], 0.0, -v[0],
        -v[1], v[0], 0.0
    )
}

/// Rotation block of a homogeneous transform.
pub fn rotation(m: &Matrix4<f64>) -> Matrix3<f64> {
    Matrix3::from_fn(|i, j| m[(i, j)])
}

/// Translation column of a homogeneous transform.
pub fn translation(m: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

/// Build a homogeneous transform from a rotation and a translation.
pub fn homogeneous(r: &Matrix3<f64>, t: &Vector3<f64>) -> Matrix4<f64> {
    let mut m = Matrix4::identity();
    for i in 0..3 {
        for j in 0..3 {
            m[(i, j)] = r[(i, j)];
        }
        m[(i, 3)] = t[i];
    }
    m
}

/// Inverse of a homogeneous transform, `[R^T, -R^T t]`.
///
/// This never fails, unlike a general 4x4 inverse, but assumes the rotation
/// block is orthonormal.
pub fn homogeneous_inverse(m: &Matrix4<f64>) -> Matrix4<f64> {
    let r_t = rotation(m).transpose();
    let t = translation(m);
    homogeneous(&r_t, &(-(r_t * t)))
}

/// Returns true if `m` is a valid homogeneous transform to within `tol`:
/// bottom row `[0, 0, 0, 1]` and an orthonormal, right handed rotation.
pub fn is_homogeneous(m: &Matrix4<f64>, tol: f64) -> bool {
    let bottom_ok = m[(3, 0)].abs() < tol
        && m[(3, 1)].abs() < tol
        && m[(3, 2)].abs() < tol
        && (m[(3, 3)] - 1.0).abs() < tol;

    let r = rotation(m);
    let ortho_ok = (r.transpose() * r - Matrix3::identity()).amax() < tol;
    let det_ok = (r.determinant() - 1.0).abs() < tol;

    bottom_ok && ortho_ok && det_ok
}

/// Theta-u (axis scaled by angle) representation of a rotation matrix.
///
/// Goes through a unit quaternion so that rotations close to pi keep their
/// axis.
pub fn theta_u(r: &Matrix3<f64>) -> Vector3<f64> {
    let rot = Rotation3::from_matrix_unchecked(*r);
    UnitQuaternion::from_rotation_matrix(&rot).scaled_axis()
}

/// Velocity twist matrix of the transform `aMb`, which maps a twist
/// expressed in frame `b` into frame `a`:
///
/// ```text
/// aVb = | aRb  [atb]x aRb |
///       |  0       aRb    |
/// ```
pub fn velocity_twist_matrix(a_m_b: &Matrix4<f64>) -> Matrix6<f64> {
    let r = rotation(a_m_b);
    let t_x_r = skew(&translation(a_m_b)) * r;

    let mut v = Matrix6::zeros();
    for i in 0..3 {
        for j in 0..3 {
            v[(i, j)] = r[(i, j)];
            v[(i, j + 3)] = t_x_r[(i, j)];
            v[(i + 3, j + 3)] = r[(i, j)];
        }
    }
    v
}
