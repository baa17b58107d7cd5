//! Configuration commands accepted by SwayCtrl
//!
//! Commands arrive as JSON objects tagged by `type`, for example:
//!
//! ```json
//! {"type": "set_maximum_velocity", "x_ms": 0.1, "y_ms": 0.1, "yaw_rads": 0.2}
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::Matrix4;
use serde::{Deserialize, Serialize};

// Internal
use super::{SwayCtrlError, Timestamp};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A configuration command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwayCmd {
    /// Start tracking the given desired object pose `cdMo`, given row by row.
    Initialize {
        desired_pose: [[f64; 4]; 4],
        timestamp: Timestamp
    },

    /// Overwrite the velocity limits.
    SetMaximumVelocity {
        x_ms: f64,
        y_ms: f64,
        yaw_rads: f64
    },

    /// Stop tracking.
    Stop
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SwayCmd {
    /// Parse a command from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, SwayCtrlError> {
        serde_json::from_str(json)
            .map_err(|e| SwayCtrlError::InvalidCmd(e.to_string()))
    }

    /// Build an `Initialize` command from a pose matrix.
    pub fn initialize(desired_pose: &Matrix4<f64>, timestamp: Timestamp) -> Self {
        let mut rows = [[0.0; 4]; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = desired_pose[(i, j)];
            }
        }

        SwayCmd::Initialize {
            desired_pose: rows,
            timestamp
        }
    }

    /// The desired pose of an `Initialize` command as a matrix.
    pub fn desired_pose_matrix(&self) -> Option<Matrix4<f64>> {
        match self {
            SwayCmd::Initialize { desired_pose, .. } => {
                Some(Matrix4::from_fn(|i, j| desired_pose[i][j]))
            },
            _ => None
        }
    }
}
