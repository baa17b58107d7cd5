//! # Servo task
//!
//! Pose based visual servoing on two features built from `cdMc`:
//!
//! - the translation `t` of `cdMc`, with interaction matrix `[cdRc, 0]`,
//! - the theta-u vector of `cdRc`, with interaction matrix `[0, Lw]` where
//!   `Lw = I + theta/2 [u]x + (1 - sinc(theta) / sinc^2(theta/2)) [u]x^2`.
//!
//! Both features have a desired value of zero, so the stacked feature is
//! also the task error. The interaction matrix is evaluated at the current
//! pose every cycle.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use nalgebra::{Matrix3, Matrix4, Matrix6, Vector3, Vector6};

// Internal
use util::maths::{rotation, sinc, skew, theta_u, translation};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Below this angle the rotation axis is undefined and `Lw` is the identity.
const MIN_THETA_RAD: f64 = 1e-6;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Result of one evaluation of the control law.
#[derive(Debug, Clone, Copy)]
pub struct ControlLaw {
    /// Camera velocity demand, expressed in the current camera frame.
    pub velocity_cam: Vector6<f64>,

    /// Stacked interaction matrix of both features.
    pub interaction: Matrix6<f64>,

    /// Stacked task error `[t, theta * u]`.
    pub error: Vector6<f64>,
}

/// The servoing task, with a fixed gain.
#[derive(Debug, Clone, Copy)]
pub struct ServoTask {
    gain: f64,
    pinv_threshold: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ControlLaw {
    /// Law used when the task cannot be evaluated.
    fn degenerate() -> Self {
        Self {
            velocity_cam: Vector6::zeros(),
            interaction: Matrix6::zeros(),
            error: Vector6::repeat(f64::NAN),
        }
    }
}

impl ServoTask {
    /// Create a new task with the given gain and pseudo-inverse singular value
    /// threshold.
    pub fn new(gain: f64, pinv_threshold: f64) -> Self {
        Self {
            gain,
            pinv_threshold,
        }
    }

    /// Compute the camera velocity bringing `cdMc` to the identity.
    ///
    /// A non-finite `cdMc` commands no motion, with a zero interaction matrix
    /// and a NaN error so that the task never counts as converged.
    pub fn compute_control_law(&self, cd_m_c: &Matrix4<f64>) -> ControlLaw {
        // The SVD does not terminate on non-finite input
        if !cd_m_c.iter().all(|v| v.is_finite()) {
            warn!("Non-finite relative pose, no motion commanded");
            return ControlLaw::degenerate();
        }

        let cd_r_c = rotation(cd_m_c);
        let t = translation(cd_m_c);
        let tu = theta_u(&cd_r_c);

        let mut error = Vector6::zeros();
        let mut interaction = Matrix6::zeros();
        let l_w = theta_u_interaction(&tu);

        for i in 0..3 {
            error[i] = t[i];
            error[i + 3] = tu[i];

            for j in 0..3 {
                interaction[(i, j)] = cd_r_c[(i, j)];
                interaction[(i + 3, j + 3)] = l_w[(i, j)];
            }
        }

        if !interaction.iter().chain(error.iter()).all(|v| v.is_finite()) {
            warn!("Non-finite task error or interaction matrix, no motion commanded");
            return ControlLaw::degenerate();
        }

        // The SVD pseudo-inverse only fails on a negative threshold, in
        // which case no motion is commanded.
        let interaction_pinv = match interaction.pseudo_inverse(self.pinv_threshold) {
            Ok(p) => p,
            Err(e) => {
                warn!("Interaction matrix pseudo-inverse failed: {}", e);
                Matrix6::zeros()
            }
        };

        ControlLaw {
            velocity_cam: -self.gain * (interaction_pinv * error),
            interaction,
            error,
        }
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Rotational block `Lw` of the theta-u feature interaction matrix.
fn theta_u_interaction(tu: &Vector3<f64>) -> Matrix3<f64> {
    let theta = tu.norm();

    if theta < MIN_THETA_RAD {
        return Matrix3::identity();
    }

    let u_x = skew(&(tu / theta));
    let half_sinc = sinc(theta / 2.0);

    Matrix3::identity()
        + u_x * (theta / 2.0)
        + u_x * u_x * (1.0 - sinc(theta) / (half_sinc * half_sinc))
}
