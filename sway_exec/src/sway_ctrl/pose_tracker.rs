//! Relative pose tracking between the current and desired camera frames

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use nalgebra::Matrix4;
use util::maths::homogeneous_inverse;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Holds the desired object pose `cdMo`, fixed when tracking starts, and the
/// latest relative pose `cdMc`.
#[derive(Debug, Clone)]
pub struct PoseTracker {
    /// Desired pose of the object in the camera frame.
    desired_c_m_o: Option<Matrix4<f64>>,

    /// Current camera pose in the desired camera frame.
    cd_m_c: Matrix4<f64>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for PoseTracker {
    fn default() -> Self {
        Self {
            desired_c_m_o: None,
            cd_m_c: Matrix4::identity(),
        }
    }
}

impl PoseTracker {
    /// Fix the desired object pose `cdMo`.
    pub fn set_desired(&mut self, cd_m_o: Matrix4<f64>) {
        self.desired_c_m_o = Some(cd_m_o);
        self.cd_m_c = Matrix4::identity();
    }

    /// The desired object pose, if one has been set.
    pub fn desired(&self) -> Option<&Matrix4<f64>> {
        self.desired_c_m_o.as_ref()
    }

    /// The relative pose computed on the last update.
    pub fn current(&self) -> &Matrix4<f64> {
        &self.cd_m_c
    }

    /// Update the relative pose from a new measurement of `cMo`:
    /// `cdMc = cdMo * cMo^-1`.
    ///
    /// Returns `None` if no desired pose has been set.
    pub fn update(&mut self, c_m_o: &Matrix4<f64>) -> Option<Matrix4<f64>> {
        let cd_m_o = self.desired_c_m_o?;
        self.cd_m_c = cd_m_o * homogeneous_inverse(c_m_o);
        Some(self.cd_m_c)
    }
}
