//! # Simulation
//!
//! A planar base (x, y, yaw) carrying a forward looking camera, swaying
//! laterally while it walks. The base follows the velocity demand exactly,
//! apart from the sway, which shows up both in the measured poses and in the
//! CoM velocity measured through the Jacobian.
//!
//! The simulated CoM Jacobian is `[I3 | 0]`, so the first three joint
//! velocities are the CoM velocity (x, y, yaw) in the waist frame.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{DMatrix, DVector, Matrix3, Matrix4, Rotation3, Vector3};
use serde::Deserialize;
use std::f64::consts::PI;

// Internal
use crate::sway_ctrl::{SwayInputs, Timestamp, VelocitySink, NUM_COM_AXES};
use util::maths::{homogeneous, homogeneous_inverse};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the simulated world.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Number of joints, at least 3.
    pub num_joints: usize,

    /// Units: seconds
    pub cycle_period_s: f64,

    /// The simulation ends after this many cycles even if the controller has
    /// not converged.
    pub max_cycles: u64,

    /// Initial waist pose (x, y, yaw).
    ///
    /// Units: meters, meters, radians
    pub start_pose: [f64; 3],

    /// Waist pose at which the camera sees the object at its desired pose.
    ///
    /// Units: meters, meters, radians
    pub goal_pose: [f64; 3],

    /// Position of the object in the world.
    ///
    /// Units: meters
    pub object_position_m: [f64; 3],

    /// Position of the camera in the waist frame.
    ///
    /// Units: meters
    pub camera_position_m: [f64; 3],

    /// Amplitude of the lateral sway of the waist.
    ///
    /// Units: meters
    pub sway_amplitude_m: f64,

    /// Units: hertz
    pub sway_freq_hz: f64,

    /// Velocity limits sent to the controller.
    ///
    /// Units: meters/second, meters/second, radians/second
    pub max_velocity: [f64; 3],
}

/// The simulated world.
pub struct SimWorld {
    params: SimParams,

    /// Units: seconds
    time_s: f64,

    /// Waist pose without the sway (x, y, yaw).
    base_pose: [f64; 3],

    /// Object pose in the world frame.
    w_m_obj: Matrix4<f64>,

    /// Camera pose in the waist frame.
    waist_m_cam: Matrix4<f64>,

    /// Velocity demand being executed (x, y, yaw rate).
    cmd_velocity: Vector3<f64>,

    com_jacobian: DMatrix<f64>,
    joint_velocity: DVector<f64>,
}

/// Records the velocity demands published by the controller.
#[derive(Debug)]
pub struct DemandLog {
    /// Timestamp and value of the last demand.
    pub last: Option<(Timestamp, Vector3<f64>)>,

    /// Largest absolute demand seen on each axis.
    pub peak: Vector3<f64>,

    pub num_published: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for SimParams {
    fn default() -> Self {
        Self {
            num_joints: 6,
            cycle_period_s: 0.005,
            max_cycles: 10_000,
            start_pose: [0.0, 0.0, 0.0],
            goal_pose: [1.0, 0.3, 0.2],
            object_position_m: [3.0, 0.0, 0.6],
            camera_position_m: [0.1, 0.0, 0.6],
            sway_amplitude_m: 0.02,
            sway_freq_hz: 1.0,
            max_velocity: [0.3, 0.2, 0.5],
        }
    }
}

impl Default for DemandLog {
    fn default() -> Self {
        Self {
            last: None,
            peak: Vector3::zeros(),
            num_published: 0,
        }
    }
}

impl SimWorld {
    pub fn new(params: SimParams) -> Self {
        let num_joints = params.num_joints.max(NUM_COM_AXES);

        // Camera axes in the waist frame: x to the right, y down, z forward
        let waist_r_cam = Matrix3::new(
            0.0, 0.0, 1.0,
            -1.0, 0.0, 0.0,
            0.0, -1.0, 0.0
        );

        let com_jacobian = DMatrix::from_fn(
            NUM_COM_AXES, num_joints, |i, j| if i == j { 1.0 } else { 0.0 });

        let mut world = Self {
            time_s: 0.0,
            base_pose: params.start_pose,
            w_m_obj: homogeneous(
                &Matrix3::identity(),
                &Vector3::from_column_slice(&params.object_position_m)
            ),
            waist_m_cam: homogeneous(
                &waist_r_cam,
                &Vector3::from_column_slice(&params.camera_position_m)
            ),
            cmd_velocity: Vector3::zeros(),
            com_jacobian,
            joint_velocity: DVector::zeros(num_joints),
            params,
        };
        world.update_joint_velocity();

        world
    }

    pub fn params(&self) -> &SimParams {
        &self.params
    }

    pub fn time_s(&self) -> f64 {
        self.time_s
    }

    /// Waist pose without the sway (x, y, yaw).
    pub fn base_pose(&self) -> [f64; 3] {
        self.base_pose
    }

    /// The desired object pose `cdMo`, as seen from the goal waist pose.
    pub fn desired_pose(&self) -> Matrix4<f64> {
        let w_m_cam = self.waist_pose(&self.params.goal_pose, 0.0) * self.waist_m_cam;
        homogeneous_inverse(&w_m_cam) * self.w_m_obj
    }

    /// Execute `velocity` (x, y, yaw rate, in the waist frame) for `dt_s`
    /// seconds.
    pub fn advance(&mut self, velocity: &Vector3<f64>, dt_s: f64) {
        let yaw = self.base_pose[2];
        let (s, c) = yaw.sin_cos();

        self.base_pose[0] += (velocity[0] * c - velocity[1] * s) * dt_s;
        self.base_pose[1] += (velocity[0] * s + velocity[1] * c) * dt_s;
        self.base_pose[2] += velocity[2] * dt_s;

        self.time_s += dt_s;
        self.cmd_velocity = *velocity;
        self.update_joint_velocity();
    }

    /// Lateral sway offset of the waist.
    ///
    /// Units: meters
    pub fn sway_m(&self) -> f64 {
        self.params.sway_amplitude_m
            * (2.0 * PI * self.params.sway_freq_hz * self.time_s).sin()
    }

    fn sway_rate_ms(&self) -> f64 {
        let w = 2.0 * PI * self.params.sway_freq_hz;
        self.params.sway_amplitude_m * w * (w * self.time_s).cos()
    }

    /// Waist pose in the world, offset laterally by `sway_m`.
    fn waist_pose(&self, pose: &[f64; 3], sway_m: f64) -> Matrix4<f64> {
        let r = Rotation3::from_axis_angle(&Vector3::z_axis(), pose[2]);
        let lateral = r * Vector3::y();
        let t = Vector3::new(pose[0], pose[1], 0.0) + lateral * sway_m;

        homogeneous(r.matrix(), &t)
    }

    fn current_w_m_cam(&self) -> Matrix4<f64> {
        self.waist_pose(&self.base_pose, self.sway_m()) * self.waist_m_cam
    }

    /// The actual CoM velocity is the demand plus the sway.
    fn update_joint_velocity(&mut self) {
        self.joint_velocity[0] = self.cmd_velocity[0];
        self.joint_velocity[1] = self.cmd_velocity[1] + self.sway_rate_ms();
        self.joint_velocity[2] = self.cmd_velocity[2];
    }
}

impl SwayInputs for SimWorld {
    fn sensor_pose(&self, _t: Timestamp) -> Matrix4<f64> {
        homogeneous_inverse(&self.current_w_m_cam()) * self.w_m_obj
    }

    fn com_jacobian(&self, _t: Timestamp) -> &DMatrix<f64> {
        &self.com_jacobian
    }

    fn joint_velocity(&self, _t: Timestamp) -> &DVector<f64> {
        &self.joint_velocity
    }

    /// The pattern generator plans exactly the last demand.
    fn ref_com_velocity(&self, _t: Timestamp) -> Vector3<f64> {
        self.cmd_velocity
    }

    fn world_to_base(&self, _t: Timestamp) -> Matrix4<f64> {
        self.waist_pose(&self.base_pose, self.sway_m())
    }

    fn world_to_sensor(&self, _t: Timestamp) -> Matrix4<f64> {
        self.current_w_m_cam()
    }
}

impl VelocitySink for DemandLog {
    fn publish(&mut self, t: Timestamp, velocity: &Vector3<f64>) {
        for i in 0..3 {
            self.peak[i] = self.peak[i].max(velocity[i].abs());
        }
        self.last = Some((t, *velocity));
        self.num_published += 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use util::maths::is_homogeneous;

    fn still_world() -> SimWorld {
        let mut params = SimParams::default();
        params.sway_amplitude_m = 0.0;
        SimWorld::new(params)
    }

    #[test]
    fn test_desired_pose_at_goal() {
        let mut params = SimParams::default();
        params.sway_amplitude_m = 0.0;
        params.start_pose = params.goal_pose;
        let world = SimWorld::new(params);

        let c_m_o = world.sensor_pose(0);
        assert!(is_homogeneous(&c_m_o, 1e-9));
        assert!((c_m_o - world.desired_pose()).amax() < 1e-12);
    }

    #[test]
    fn test_camera_sees_object_ahead() {
        // Object 3 m ahead at camera height, camera 0.1 m ahead of the waist
        let world = still_world();
        let c_m_o = world.sensor_pose(0);

        assert!((c_m_o[(0, 3)]).abs() < 1e-12);
        assert!((c_m_o[(1, 3)]).abs() < 1e-12);
        assert!((c_m_o[(2, 3)] - 2.9).abs() < 1e-12);
    }

    #[test]
    fn test_advance() {
        let mut world = still_world();

        // Quarter turn then forward, ends up moving along world y
        world.advance(&Vector3::new(0.0, 0.0, PI / 2.0), 1.0);
        world.advance(&Vector3::new(0.5, 0.0, 0.0), 2.0);

        let p = world.base_pose();
        assert!(p[0].abs() < 1e-12);
        assert!((p[1] - 1.0).abs() < 1e-12);
        assert!((p[2] - PI / 2.0).abs() < 1e-12);
        assert!((world.time_s() - 3.0).abs() < 1e-12);

        // The Jacobian maps the joint velocity back to the demand
        let dcom = world.com_jacobian(0) * world.joint_velocity(0);
        assert!((dcom[0] - 0.5).abs() < 1e-12);
        assert_eq!(world.ref_com_velocity(0), Vector3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn test_demand_log() {
        let mut log = DemandLog::default();
        log.publish(1, &Vector3::new(0.1, -0.3, 0.0));
        log.publish(2, &Vector3::new(-0.2, 0.1, 0.05));

        assert_eq!(log.num_published, 2);
        assert_eq!(log.last, Some((2, Vector3::new(-0.2, 0.1, 0.05))));
        assert_eq!(log.peak, Vector3::new(0.2, 0.3, 0.05));
    }
}
