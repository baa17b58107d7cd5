//! # Sway motion correction module
//!
//! SwayCtrl computes the velocity demand sent to the walking pattern
//! generator so that a camera carried by the robot's waist converges onto a
//! desired pose relative to a target object, while the sway of the waist
//! caused by centre of mass (CoM) motion is measured and integrated.
//!
//! Each cycle runs the following chain:
//!
//!  1. The pose tracker computes `cdMc`, the current camera pose in the
//!     desired camera frame, from the measured `cMo` and the desired `cdMo`.
//!  2. The servo task builds a translation and a theta-u feature from `cdMc`
//!     and computes the camera velocity `-lambda * L^+ * e`.
//!  3. The disturbance corrector compares the reference CoM velocity with
//!     the one measured through the CoM Jacobian, projects the difference
//!     through `L` and integrates it.
//!  4. The camera velocity is transformed into the waist frame.
//!  5. The planar part (x, y, yaw rate) is saturated against the limits.
//!  6. If the planar pose error is small enough the controller stops.
//!
//! Frames are named in the `aMb` style: `cMo` is the object pose in the
//! camera frame, `wMwaist` the waist pose in the world frame.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod cmd;
pub mod convergence;
pub mod disturbance;
pub mod frame;
mod io;
mod params;
mod pose_tracker;
pub mod saturation;
pub mod servo_task;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use cmd::*;
pub use io::*;
pub use params::*;
pub use pose_tracker::PoseTracker;
pub use state::*;
use util::params as util_params;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of degrees of freedom of the servoing task (translation + theta-u).
pub const NUM_TASK_DOF: usize = 6;

/// Number of commanded base axes (x, y, yaw rate).
pub const NUM_OUT_AXES: usize = 3;

/// Number of rows the CoM Jacobian must have.
pub const NUM_COM_AXES: usize = 3;

/// Tolerance used when checking that an input matrix is a rigid transform.
pub const POSE_VALIDITY_TOL: f64 = 1e-6;

// ---------------------------------------------------------------------------
// TYPES
// ---------------------------------------------------------------------------

/// Cycle timestamp, as counted by the host's control loop.
pub type Timestamp = u64;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during SwayCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum SwayCtrlError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(util_params::LoadError),

    #[error("Invalid parameter: {0}")]
    InvalidParams(String),

    #[error("Could not initialise the archives: {0}")]
    ArchiveInitError(String),

    /// The CoM Jacobian and joint velocity do not agree. The cycle outputs
    /// zero velocity but the controller keeps tracking.
    #[error("CoM Jacobian is {rows}x{cols}, expected 3x{qdot_len} to match the joint velocity")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        qdot_len: usize
    },

    /// An input of the cycle contains NaN or infinite values. The cycle
    /// outputs zero velocity but the controller keeps tracking.
    #[error("Non-finite values in the {0}")]
    NonFiniteInput(&'static str),

    #[error("Sensor pose is not a rigid transform")]
    InvalidSensorPose,

    #[error("Maximum {axis} velocity must be finite and non-negative, got {value}")]
    InvalidVelocityLimit {
        axis: &'static str,
        value: f64
    },

    #[error("Recieved an invalid command: {0}")]
    InvalidCmd(String),
}
