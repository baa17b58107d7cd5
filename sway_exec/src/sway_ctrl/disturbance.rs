//! # Disturbance corrector
//!
//! Measures the sway of the robot as the difference between the CoM velocity
//! requested from the pattern generator and the one actually produced by the
//! joints, and integrates its effect on the task error.
//!
//! Only the planar channels (x, y, yaw) carry a disturbance, the z, roll and
//! pitch components of the disturbance twist are always zero.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{DMatrix, DVector, Matrix6, Vector3, Vector6};

// Internal
use super::{SwayCtrlError, NUM_COM_AXES};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Two stage forward Euler integrator of the sway correction.
#[derive(Debug, Clone, Copy)]
pub struct DisturbanceCorrector {
    /// Integral of `L * bk`.
    integral_correction: Vector6<f64>,

    /// Integral of `integral_correction`. Kept for diagnostics only.
    error_accumulator: Vector6<f64>,

    /// Disturbance twist from the last call to `correct`.
    disturbance: Vector6<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for DisturbanceCorrector {
    fn default() -> Self {
        Self {
            integral_correction: Vector6::zeros(),
            error_accumulator: Vector6::zeros(),
            disturbance: Vector6::zeros(),
        }
    }
}

impl DisturbanceCorrector {
    /// Zero both integration stages.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn integral_correction(&self) -> &Vector6<f64> {
        &self.integral_correction
    }

    pub fn error_accumulator(&self) -> &Vector6<f64> {
        &self.error_accumulator
    }

    pub fn disturbance(&self) -> &Vector6<f64> {
        &self.disturbance
    }

    /// Integrate one step of sway correction and return the updated
    /// `integral_correction`.
    ///
    /// `step_s` is the integration step. On a shape mismatch between the
    /// Jacobian and the joint velocity nothing is integrated.
    pub fn correct(
        &mut self,
        jacobian_com: &DMatrix<f64>,
        joint_velocity: &DVector<f64>,
        ref_com_velocity: &Vector3<f64>,
        interaction: &Matrix6<f64>,
        step_s: f64
    ) -> Result<&Vector6<f64>, SwayCtrlError> {
        check_shape(jacobian_com, joint_velocity)?;

        let dcom = com_velocity(jacobian_com, joint_velocity);
        self.disturbance = disturbance_twist(ref_com_velocity, &dcom);

        let correction_rate = interaction * self.disturbance;
        self.integral_correction += correction_rate * step_s;
        self.error_accumulator += self.integral_correction * step_s;

        Ok(&self.integral_correction)
    }
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Check that the CoM Jacobian is `3 x N` with `N` the joint velocity length.
pub fn check_shape(
    jacobian_com: &DMatrix<f64>,
    joint_velocity: &DVector<f64>
) -> Result<(), SwayCtrlError> {
    if jacobian_com.nrows() != NUM_COM_AXES
        || jacobian_com.ncols() != joint_velocity.len()
    {
        return Err(SwayCtrlError::ShapeMismatch {
            rows: jacobian_com.nrows(),
            cols: jacobian_com.ncols(),
            qdot_len: joint_velocity.len(),
        })
    }

    Ok(())
}

/// CoM velocity `J * qdot` as (x, y, yaw). The shapes must already have
/// been checked.
///
/// Computed row by row so no intermediate dynamic vector is allocated.
pub fn com_velocity(
    jacobian_com: &DMatrix<f64>,
    joint_velocity: &DVector<f64>
) -> Vector3<f64> {
    Vector3::from_fn(|i, _| {
        jacobian_com
            .row(i)
            .iter()
            .zip(joint_velocity.iter())
            .map(|(j, q)| j * q)
            .sum()
    })
}

/// Disturbance twist `bk` between the reference and actual CoM velocities.
pub fn disturbance_twist(reference: &Vector3<f64>, actual: &Vector3<f64>) -> Vector6<f64> {
    Vector6::new(
        reference[0] - actual[0],
        reference[1] - actual[1],
        0.0,
        0.0,
        0.0,
        reference[2] - actual[2]
    )
}

#[cfg(test)]
mod test {
    use super::*;

    fn planar_jacobian(n: usize) -> DMatrix<f64> {
        DMatrix::from_fn(3, n, |i, j| if i == j { 1.0 } else { 0.0 })
    }

    #[test]
    fn test_check_shape() {
        let qdot = DVector::zeros(4);
        assert!(check_shape(&planar_jacobian(4), &qdot).is_ok());

        match check_shape(&DMatrix::zeros(4, 4), &qdot) {
            Err(SwayCtrlError::ShapeMismatch { rows: 4, cols: 4, qdot_len: 4 }) => (),
            r => panic!("Expected a shape mismatch, got {:?}", r)
        }
        match check_shape(&planar_jacobian(5), &qdot) {
            Err(SwayCtrlError::ShapeMismatch { rows: 3, cols: 5, qdot_len: 4 }) => (),
            r => panic!("Expected a shape mismatch, got {:?}", r)
        }
    }

    #[test]
    fn test_com_velocity() {
        let jac = DMatrix::from_row_slice(3, 2, &[
            1.0, 2.0,
            0.0, -1.0,
            0.5, 0.5
        ]);
        let qdot = DVector::from_vec(vec![2.0, 1.0]);

        assert_eq!(com_velocity(&jac, &qdot), Vector3::new(4.0, -1.0, 1.5));
    }

    #[test]
    fn test_disturbance_twist() {
        let bk = disturbance_twist(&Vector3::new(0.1, 0.2, 0.3), &Vector3::new(0.05, 0.25, 0.0));
        assert!((bk - Vector6::new(0.05, -0.05, 0.0, 0.0, 0.0, 0.3)).norm() < 1e-12);
    }

    #[test]
    fn test_forward_euler_recurrence() {
        let mut corrector = DisturbanceCorrector::default();
        let jac = planar_jacobian(3);
        let qdot = DVector::zeros(3);
        let ref_vel = Vector3::new(0.1, 0.0, 0.2);
        let l = Matrix6::identity() * 2.0;
        let step_s = 0.005;

        // Constant rate, so the first stage grows linearly and the second
        // quadratically
        let rate = Vector6::new(0.2, 0.0, 0.0, 0.0, 0.0, 0.4);
        let mut expected_acc = Vector6::zeros();
        for k in 1..=10 {
            let integral = *corrector.correct(&jac, &qdot, &ref_vel, &l, step_s).unwrap();
            let expected_integral = rate * step_s * k as f64;
            expected_acc += expected_integral * step_s;

            assert!((integral - expected_integral).norm() < 1e-12);
            assert!((corrector.error_accumulator() - expected_acc).norm() < 1e-12);
        }

        // A rejected cycle leaves both stages untouched
        let before = *corrector.integral_correction();
        assert!(corrector.correct(&planar_jacobian(4), &qdot, &ref_vel, &l, step_s).is_err());
        assert_eq!(corrector.integral_correction(), &before);

        corrector.reset();
        assert_eq!(corrector.integral_correction(), &Vector6::zeros());
        assert_eq!(corrector.error_accumulator(), &Vector6::zeros());
    }
}
