//! Input and output interfaces of SwayCtrl
//!
//! The controller does not own its inputs. Each cycle it either receives a
//! borrowed `CycleInputs` snapshot directly, or pulls the snapshot from a
//! `SwayInputs` provider for the cycle's timestamp and pushes the result into
//! a `VelocitySink`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{DMatrix, DVector, Matrix4, Vector3};
use serde::{Deserialize, Serialize};

// Internal
use super::Timestamp;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Borrowed snapshot of every input to one control cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleInputs<'a> {
    pub timestamp: Timestamp,

    /// Current object pose in the camera frame, `cMo`.
    pub sensor_pose: &'a Matrix4<f64>,

    /// CoM Jacobian, `3 x N`.
    pub com_jacobian: &'a DMatrix<f64>,

    /// Joint velocity, length `N`.
    pub joint_velocity: &'a DVector<f64>,

    /// CoM velocity planned by the pattern generator (x, y, yaw).
    pub ref_com_velocity: &'a Vector3<f64>,

    /// Waist pose in the world frame.
    pub world_to_base: &'a Matrix4<f64>,

    /// Camera pose in the world frame.
    pub world_to_sensor: &'a Matrix4<f64>,

    /// Measured time since the previous cycle.
    ///
    /// Units: seconds
    pub dt_s: f64,
}

/// Owned version of `CycleInputs`, used as the `State::InputData` of the
/// controller and for replaying recorded cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputData {
    pub timestamp: Timestamp,
    pub sensor_pose: Matrix4<f64>,
    pub com_jacobian: DMatrix<f64>,
    pub joint_velocity: DVector<f64>,
    pub ref_com_velocity: Vector3<f64>,
    pub world_to_base: Matrix4<f64>,
    pub world_to_sensor: Matrix4<f64>,
    pub dt_s: f64,
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Provider of the controller's per cycle inputs.
///
/// All values are snapshots at the given timestamp, no interpolation is
/// expected.
pub trait SwayInputs {
    /// Object pose in the camera frame, `cMo`.
    fn sensor_pose(&self, t: Timestamp) -> Matrix4<f64>;

    fn com_jacobian(&self, t: Timestamp) -> &DMatrix<f64>;

    fn joint_velocity(&self, t: Timestamp) -> &DVector<f64>;

    fn ref_com_velocity(&self, t: Timestamp) -> Vector3<f64>;

    fn world_to_base(&self, t: Timestamp) -> Matrix4<f64>;

    fn world_to_sensor(&self, t: Timestamp) -> Matrix4<f64>;
}

/// Consumer of the controller's velocity demand (x, y, yaw rate).
pub trait VelocitySink {
    fn publish(&mut self, t: Timestamp, velocity: &Vector3<f64>);
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl InputData {
    /// Borrow this data as a cycle snapshot.
    pub fn as_cycle(&self) -> CycleInputs<'_> {
        CycleInputs {
            timestamp: self.timestamp,
            sensor_pose: &self.sensor_pose,
            com_jacobian: &self.com_jacobian,
            joint_velocity: &self.joint_velocity,
            ref_com_velocity: &self.ref_com_velocity,
            world_to_base: &self.world_to_base,
            world_to_sensor: &self.world_to_sensor,
            dt_s: self.dt_s,
        }
    }
}
