//! Implementations for the SwayCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, error, info, trace, warn};
use nalgebra::{Matrix4, Vector3, Vector6};
use serde::Serialize;

// Internal
use super::{
    convergence,
    disturbance::{self, DisturbanceCorrector},
    frame,
    saturation::VelocitySaturator,
    servo_task::ServoTask,
    CycleInputs, InputData, Params, PoseTracker, SwayCmd, SwayCtrlError,
    SwayInputs, Timestamp, VelocitySink,
    NUM_OUT_AXES, NUM_TASK_DOF, POSE_VALIDITY_TOL};
use util::{
    archive::{Archived, Archiver},
    maths::is_homogeneous,
    module::State,
    params,
    session::{self, Session}};

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// The controller's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControllerState {
    /// No desired pose, the output is always zero.
    Uninitialized,

    /// Servoing onto the desired pose with the accumulators running.
    Tracking,
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Sway motion correction module state
pub struct SwayCtrl {
    pub(crate) params: Params,

    state: ControllerState,

    /// Timestamp of the `initialize` which started the current tracking.
    tracking_since: Option<Timestamp>,

    /// Velocity limits (x, y, yaw rate).
    ///
    /// Units: meters/second, meters/second, radians/second
    limits: Vector3<f64>,

    pose_tracker: PoseTracker,
    servo_task: ServoTask,
    corrector: DisturbanceCorrector,
    saturator: VelocitySaturator,

    /// Task error from the last cycle that reached the servo task.
    last_error: Vector6<f64>,

    pub(crate) report: StatusReport,
    arch_report: Archiver,
}

/// Status report for SwayCtrl processing.
#[derive(Clone, Copy, Default, Serialize, Debug)]
pub struct StatusReport {
    pub timestamp: Timestamp,

    /// True if the controller was tracking when the cycle started.
    pub tracking: bool,

    /// The CoM Jacobian and joint velocity disagreed, zero was output.
    pub shape_mismatch: bool,

    /// An input was non-finite or the sensor pose was not a rigid
    /// transform, zero was output.
    pub invalid_input: bool,

    /// The monitored error fell below the stop threshold on this cycle.
    pub converged: bool,

    /// The computed output was not finite and was replaced by zero.
    pub non_finite_output: bool,

    pub monitored_error: f64,

    /// Factor applied by the saturator, 1 if unsaturated.
    pub sat_factor: f64,

    pub pose_error: [f64; NUM_TASK_DOF],
    pub vel_cam: [f64; NUM_TASK_DOF],
    pub vel_waist: [f64; NUM_TASK_DOF],

    /// Disturbance twist measured through the CoM Jacobian.
    pub disturbance: [f64; NUM_TASK_DOF],

    pub integral_correction: [f64; NUM_TASK_DOF],
    pub error_accumulator: [f64; NUM_TASK_DOF],

    /// Velocity demand actually output (x, y, yaw rate).
    pub output: [f64; NUM_OUT_AXES],
}

/// Flat view of the status report for the CSV archive.
#[derive(Serialize)]
struct ArchRecord {
    time_s: f64,
    timestamp: Timestamp,
    tracking: bool,
    shape_mismatch: bool,
    invalid_input: bool,
    converged: bool,
    non_finite_output: bool,
    monitored_error: f64,
    sat_factor: f64,
    err_tx: f64,
    err_ty: f64,
    err_tz: f64,
    err_rx: f64,
    err_ry: f64,
    err_rz: f64,
    dist_x: f64,
    dist_y: f64,
    dist_yaw: f64,
    integral_correction_norm: f64,
    error_accumulator_norm: f64,
    out_x_ms: f64,
    out_y_ms: f64,
    out_yaw_rads: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for ControllerState {
    fn default() -> Self {
        ControllerState::Uninitialized
    }
}

impl Default for SwayCtrl {
    fn default() -> Self {
        Self::with_params(Params::default())
    }
}

impl SwayCtrl {
    /// Create a new controller from the given parameters.
    ///
    /// The initial velocity limits are `params.max_velocity`.
    pub fn new(params: Params) -> Result<Self, SwayCtrlError> {
        if !(params.gain > 0.0) {
            return Err(SwayCtrlError::InvalidParams(
                format!("gain must be positive, got {}", params.gain)))
        }
        if !(params.integration_step_s > 0.0) {
            return Err(SwayCtrlError::InvalidParams(format!(
                "integration_step_s must be positive, got {}",
                params.integration_step_s
            )))
        }
        if !(params.sat_margin_ratio >= 0.0) || !(params.sat_epsilon > 0.0) {
            return Err(SwayCtrlError::InvalidParams(format!(
                "sat_margin_ratio must be non-negative and sat_epsilon \
                 positive, got {} and {}",
                params.sat_margin_ratio, params.sat_epsilon
            )))
        }

        let [x, y, yaw] = params.max_velocity;
        let mut ctrl = Self::with_params(params);
        ctrl.set_maximum_velocity(x, y, yaw)?;

        Ok(ctrl)
    }

    fn with_params(params: Params) -> Self {
        Self {
            servo_task: ServoTask::new(params.gain, params.pinv_threshold),
            saturator: VelocitySaturator::new(
                params.sat_margin_ratio, params.sat_epsilon),
            params,
            state: ControllerState::default(),
            tracking_since: None,
            limits: Vector3::zeros(),
            pose_tracker: PoseTracker::default(),
            corrector: DisturbanceCorrector::default(),
            last_error: Vector6::zeros(),
            report: StatusReport::default(),
            arch_report: Archiver::default(),
        }
    }

    // ---- CONFIGURATION ----

    /// Start tracking the desired object pose `cdMo`.
    ///
    /// Does nothing if the controller is already tracking. Both stages of the
    /// disturbance integrator are reset.
    pub fn initialize(&mut self, desired_pose: &Matrix4<f64>, timestamp: Timestamp) {
        if self.state == ControllerState::Tracking {
            debug!(
                "Ignoring initialize at {}, already tracking since {:?}",
                timestamp, self.tracking_since
            );
            return;
        }

        if !is_homogeneous(desired_pose, POSE_VALIDITY_TOL) {
            warn!("Desired pose is not a rigid transform:{}", desired_pose);
        }

        self.pose_tracker.set_desired(*desired_pose);
        self.corrector.reset();
        self.last_error = Vector6::zeros();
        self.state = ControllerState::Tracking;
        self.tracking_since = Some(timestamp);

        info!("Tracking started at {}", timestamp);
    }

    /// Stop tracking. The output is zero from the next cycle on.
    pub fn stop(&mut self) {
        if self.state == ControllerState::Tracking {
            info!("Stopping the control law");
        }

        self.state = ControllerState::Uninitialized;
        self.tracking_since = None;
    }

    /// Overwrite the velocity limits, in effect from the next cycle.
    ///
    /// Limits must be finite and non-negative. On error the previous limits
    /// are kept.
    pub fn set_maximum_velocity(
        &mut self,
        x_ms: f64,
        y_ms: f64,
        yaw_rads: f64
    ) -> Result<(), SwayCtrlError> {
        for &(axis, value) in [("x", x_ms), ("y", y_ms), ("yaw", yaw_rads)].iter() {
            if !value.is_finite() || value < 0.0 {
                return Err(SwayCtrlError::InvalidVelocityLimit { axis, value })
            }
        }

        self.limits = Vector3::new(x_ms, y_ms, yaw_rads);
        info!(
            "Maximum velocity set to x: {} m/s, y: {} m/s, yaw: {} rad/s",
            x_ms, y_ms, yaw_rads
        );

        Ok(())
    }

    /// Execute a configuration command.
    ///
    /// Unlike `initialize`, an `Initialize` command whose pose is not a rigid
    /// transform is rejected.
    pub fn handle_cmd(&mut self, cmd: &SwayCmd) -> Result<(), SwayCtrlError> {
        match cmd {
            SwayCmd::Initialize { timestamp, .. } => {
                let pose = cmd.desired_pose_matrix()
                    .ok_or_else(|| SwayCtrlError::InvalidCmd("Missing pose".into()))?;

                if !is_homogeneous(&pose, POSE_VALIDITY_TOL) {
                    return Err(SwayCtrlError::InvalidCmd(
                        "Desired pose is not a rigid transform".into()))
                }

                self.initialize(&pose, *timestamp);
            },
            SwayCmd::SetMaximumVelocity { x_ms, y_ms, yaw_rads } => {
                self.set_maximum_velocity(*x_ms, *y_ms, *yaw_rads)?
            },
            SwayCmd::Stop => self.stop()
        }

        Ok(())
    }

    // ---- QUERIES ----

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn is_tracking(&self) -> bool {
        self.state == ControllerState::Tracking
    }

    pub fn tracking_since(&self) -> Option<Timestamp> {
        self.tracking_since
    }

    pub fn velocity_limits(&self) -> &Vector3<f64> {
        &self.limits
    }

    pub fn integral_correction(&self) -> &Vector6<f64> {
        self.corrector.integral_correction()
    }

    pub fn error_accumulator(&self) -> &Vector6<f64> {
        self.corrector.error_accumulator()
    }

    pub fn last_error(&self) -> &Vector6<f64> {
        &self.last_error
    }

    pub fn report(&self) -> &StatusReport {
        &self.report
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    // ---- CYCLIC PROCESSING ----

    /// Run one control cycle and return the velocity demand (x, y, yaw
    /// rate) in the waist frame.
    ///
    /// The output is zero while uninitialised, on a Jacobian shape mismatch,
    /// or if the computed demand is not finite.
    pub fn step(&mut self, inputs: &CycleInputs) -> Vector3<f64> {
        self.report = StatusReport::default();
        self.report.timestamp = inputs.timestamp;

        if self.state == ControllerState::Uninitialized {
            trace!("SwayCtrl uninitialised, no motion commanded");
            return Vector3::zeros();
        }

        self.report.tracking = true;

        let mut output = match self.try_step(inputs) {
            Ok(v) => v,
            Err(e) => {
                match e {
                    SwayCtrlError::ShapeMismatch { .. } => {
                        error!("Cycle {} rejected, zero output: {}", inputs.timestamp, e);
                        self.report.shape_mismatch = true;
                    },
                    SwayCtrlError::NonFiniteInput(_) | SwayCtrlError::InvalidSensorPose => {
                        warn!("Cycle {} rejected, zero output: {}", inputs.timestamp, e);
                        self.report.invalid_input = true;
                    },
                    _ => warn!("Cycle {} failed, zero output: {}", inputs.timestamp, e)
                }
                Vector3::zeros()
            }
        };

        if !output.iter().all(|v| v.is_finite()) {
            warn!("Non-finite velocity demand {:?} replaced by zero", output.as_slice());
            self.report.non_finite_output = true;
            output = Vector3::zeros();
        }

        self.report.output.copy_from_slice(output.as_slice());

        trace!(
            "SwayCtrl output: x {:.4} m/s, y {:.4} m/s, yaw {:.4} rad/s",
            output[0], output[1], output[2]
        );

        if self.report.converged {
            info!(
                "Pose error {:.4} below threshold {}",
                self.report.monitored_error, self.params.stop_threshold
            );
            self.stop();
        }

        output
    }

    /// Pull the inputs for timestamp `t` from `inputs`, run one cycle and
    /// publish the result to `sink`.
    pub fn cycle<I, S>(
        &mut self,
        t: Timestamp,
        dt_s: f64,
        inputs: &I,
        sink: &mut S
    ) -> Vector3<f64>
    where
        I: SwayInputs,
        S: VelocitySink
    {
        let sensor_pose = inputs.sensor_pose(t);
        let ref_com_velocity = inputs.ref_com_velocity(t);
        let world_to_base = inputs.world_to_base(t);
        let world_to_sensor = inputs.world_to_sensor(t);

        let output = self.step(&CycleInputs {
            timestamp: t,
            sensor_pose: &sensor_pose,
            com_jacobian: inputs.com_jacobian(t),
            joint_velocity: inputs.joint_velocity(t),
            ref_com_velocity: &ref_com_velocity,
            world_to_base: &world_to_base,
            world_to_sensor: &world_to_sensor,
            dt_s,
        });

        sink.publish(t, &output);

        output
    }

    fn try_step(&mut self, inputs: &CycleInputs) -> Result<Vector3<f64>, SwayCtrlError> {
        disturbance::check_shape(inputs.com_jacobian, inputs.joint_velocity)?;
        check_inputs(inputs)?;

        // A desired pose is always set while tracking
        let cd_m_c = match self.pose_tracker.update(inputs.sensor_pose) {
            Some(m) => m,
            None => return Ok(Vector3::zeros())
        };

        let law = self.servo_task.compute_control_law(&cd_m_c);
        self.last_error = law.error;

        let step_s = self.integration_step(inputs.dt_s);
        self.corrector.correct(
            inputs.com_jacobian,
            inputs.joint_velocity,
            inputs.ref_com_velocity,
            &law.interaction,
            step_s
        )?;

        let vel_waist = frame::to_base_frame(
            inputs.world_to_base,
            inputs.world_to_sensor,
            &law.velocity_cam
        );

        let planar = Vector3::new(vel_waist[0], vel_waist[1], vel_waist[5]);
        let sat_factor = self.saturator.scale_factor(&planar, &self.limits);

        self.report.sat_factor = sat_factor;
        self.report.pose_error.copy_from_slice(law.error.as_slice());
        self.report.vel_cam.copy_from_slice(law.velocity_cam.as_slice());
        self.report.vel_waist.copy_from_slice(vel_waist.as_slice());
        self.report.disturbance
            .copy_from_slice(self.corrector.disturbance().as_slice());
        self.report.integral_correction
            .copy_from_slice(self.corrector.integral_correction().as_slice());
        self.report.error_accumulator
            .copy_from_slice(self.corrector.error_accumulator().as_slice());
        self.report.monitored_error = convergence::monitored_error(&law.error);
        self.report.converged = convergence::should_stop(
            &law.error, self.params.stop_threshold);

        Ok(planar * sat_factor)
    }

    /// Step used to integrate the disturbance correction this cycle.
    fn integration_step(&self, dt_s: f64) -> f64 {
        if self.params.use_measured_dt && dt_s.is_finite() && dt_s > 0.0 {
            dt_s
        }
        else {
            self.params.integration_step_s
        }
    }
}

/// Reject inputs which would poison the task or the accumulators.
///
/// The world poses are left to the output guard, they only reach the frame
/// transform.
fn check_inputs(inputs: &CycleInputs) -> Result<(), SwayCtrlError> {
    if !inputs.sensor_pose.iter().all(|v| v.is_finite()) {
        return Err(SwayCtrlError::NonFiniteInput("sensor pose"))
    }
    if !inputs.com_jacobian.iter().all(|v| v.is_finite()) {
        return Err(SwayCtrlError::NonFiniteInput("CoM Jacobian"))
    }
    if !inputs.joint_velocity.iter().all(|v| v.is_finite()) {
        return Err(SwayCtrlError::NonFiniteInput("joint velocity"))
    }
    if !inputs.ref_com_velocity.iter().all(|v| v.is_finite()) {
        return Err(SwayCtrlError::NonFiniteInput("reference CoM velocity"))
    }
    if !is_homogeneous(inputs.sensor_pose, POSE_VALIDITY_TOL) {
        return Err(SwayCtrlError::InvalidSensorPose)
    }

    Ok(())
}

impl State for SwayCtrl {
    type InitData = &'static str;
    type InitError = SwayCtrlError;

    type InputData = InputData;
    type OutputData = Vector3<f64>;
    type StatusReport = StatusReport;
    type ProcError = SwayCtrlError;

    /// Initialise the SwayCtrl module.
    ///
    /// Expected init data is the path to the parameter file, relative to
    /// the software root's `params` directory.
    fn init(&mut self, init_data: Self::InitData, session: &Session)
        -> Result<(), Self::InitError>
    {
        let p: Params = params::load(init_data)
            .map_err(SwayCtrlError::ParamLoadError)?;

        *self = Self::new(p)?;

        self.arch_report = Archiver::from_path(
            session, "sway_ctrl/status_report.csv"
        ).map_err(|e| SwayCtrlError::ArchiveInitError(e.to_string()))?;

        Ok(())
    }

    /// Perform cyclic processing of SwayCtrl.
    ///
    /// Cycle faults are recovered internally and flagged in the status
    /// report, so this never returns an error.
    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        let output = self.step(&input_data.as_cycle());

        Ok((output, self.report))
    }

    fn make_safe(&mut self) {
        self.stop();
    }
}

impl Archived for SwayCtrl {
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let r = &self.report;

        let record = ArchRecord {
            time_s: session::get_elapsed_seconds(),
            timestamp: r.timestamp,
            tracking: r.tracking,
            shape_mismatch: r.shape_mismatch,
            invalid_input: r.invalid_input,
            converged: r.converged,
            non_finite_output: r.non_finite_output,
            monitored_error: r.monitored_error,
            sat_factor: r.sat_factor,
            err_tx: r.pose_error[0],
            err_ty: r.pose_error[1],
            err_tz: r.pose_error[2],
            err_rx: r.pose_error[3],
            err_ry: r.pose_error[4],
            err_rz: r.pose_error[5],
            dist_x: r.disturbance[0],
            dist_y: r.disturbance[1],
            dist_yaw: r.disturbance[5],
            integral_correction_norm: Vector6::from_column_slice(&r.integral_correction).norm(),
            error_accumulator_norm: Vector6::from_column_slice(&r.error_accumulator).norm(),
            out_x_ms: r.output[0],
            out_y_ms: r.output[1],
            out_yaw_rads: r.output[2],
        };

        self.arch_report.serialise(record)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use nalgebra::{DMatrix, DVector, Matrix3};
    use util::maths::homogeneous;

    /// Owned inputs with an identity sensor pose and no sway.
    fn still_inputs(num_joints: usize) -> InputData {
        InputData {
            timestamp: 0,
            sensor_pose: Matrix4::identity(),
            com_jacobian: DMatrix::zeros(3, num_joints),
            joint_velocity: DVector::zeros(num_joints),
            ref_com_velocity: Vector3::zeros(),
            world_to_base: Matrix4::identity(),
            world_to_sensor: Matrix4::identity(),
            dt_s: 0.005,
        }
    }

    /// Desired pose with the object 1 m along the optical axis.
    fn desired() -> Matrix4<f64> {
        homogeneous(&Matrix3::identity(), &Vector3::new(0.0, 0.0, 1.0))
    }

    /// Inputs where the object is seen at 1.5 m, far from the desired pose.
    fn far_inputs(num_joints: usize) -> InputData {
        let mut inputs = still_inputs(num_joints);
        inputs.sensor_pose = homogeneous(
            &Matrix3::identity(), &Vector3::new(0.3, 0.0, 1.5));
        inputs
    }

    #[test]
    fn test_uninitialised_outputs_zero() {
        let mut ctrl = SwayCtrl::default();
        ctrl.set_maximum_velocity(1.0, 1.0, 1.0).unwrap();

        let inputs = far_inputs(4);
        for _ in 0..3 {
            assert_eq!(ctrl.step(&inputs.as_cycle()), Vector3::zeros());
        }
        assert_eq!(ctrl.state(), ControllerState::Uninitialized);
        assert!(!ctrl.report().tracking);

        // A mismatched Jacobian does not matter while uninitialised
        let mut inputs = far_inputs(4);
        inputs.com_jacobian = DMatrix::zeros(4, 4);
        assert_eq!(ctrl.step(&inputs.as_cycle()), Vector3::zeros());
    }

    #[test]
    fn test_shape_mismatch() {
        let mut ctrl = SwayCtrl::default();
        ctrl.set_maximum_velocity(0.1, 0.1, 0.1).unwrap();
        ctrl.initialize(&desired(), 0);

        // Four row Jacobian
        let mut inputs = far_inputs(4);
        inputs.com_jacobian = DMatrix::zeros(4, 4);
        assert_eq!(ctrl.step(&inputs.as_cycle()), Vector3::zeros());
        assert!(ctrl.report().shape_mismatch);
        assert_eq!(ctrl.state(), ControllerState::Tracking);

        // Joint velocity length disagreeing with the Jacobian columns
        let mut inputs = far_inputs(4);
        inputs.joint_velocity = DVector::zeros(5);
        assert_eq!(ctrl.step(&inputs.as_cycle()), Vector3::zeros());
        assert!(ctrl.report().shape_mismatch);
        assert_eq!(ctrl.state(), ControllerState::Tracking);

        // Nothing was integrated
        assert_eq!(ctrl.integral_correction(), &Vector6::zeros());

        // Recovers on the next good cycle
        let out = ctrl.step(&far_inputs(4).as_cycle());
        assert!(!ctrl.report().shape_mismatch);
        assert!(out.norm() > 0.0);
    }

    #[test]
    fn test_identity_converges_immediately() {
        let mut ctrl = SwayCtrl::default();
        ctrl.set_maximum_velocity(0.1, 0.1, 0.1).unwrap();
        ctrl.initialize(&Matrix4::identity(), 0);
        assert!(ctrl.is_tracking());

        let out = ctrl.step(&still_inputs(6).as_cycle());

        assert_eq!(out, Vector3::zeros());
        assert!(ctrl.report().converged);
        assert_eq!(ctrl.state(), ControllerState::Uninitialized);
    }

    #[test]
    fn test_limits_default_to_zero() {
        let mut ctrl = SwayCtrl::default();
        assert_eq!(ctrl.velocity_limits(), &Vector3::zeros());

        ctrl.initialize(&desired(), 0);
        let inputs = far_inputs(4);
        for _ in 0..5 {
            assert_eq!(ctrl.step(&inputs.as_cycle()), Vector3::zeros());
        }

        // Still tracking, the demand is just saturated away
        assert!(ctrl.is_tracking());
        assert!(ctrl.report().vel_cam.iter().any(|v| *v != 0.0));
    }

    #[test]
    fn test_output_bounded() {
        let mut ctrl = SwayCtrl::default();
        ctrl.set_maximum_velocity(0.05, 0.02, 0.1).unwrap();
        ctrl.initialize(&desired(), 0);

        let out = ctrl.step(&far_inputs(4).as_cycle());
        assert!(out[0].abs() <= 0.05 + 1e-9);
        assert!(out[1].abs() <= 0.02 + 1e-9);
        assert!(out[2].abs() <= 0.1 + 1e-9);
        assert!(ctrl.report().sat_factor < 1.0);
    }

    #[test]
    fn test_initialize_when_tracking() {
        let mut ctrl = SwayCtrl::default();
        ctrl.initialize(&desired(), 3);
        assert_eq!(ctrl.tracking_since(), Some(3));

        ctrl.initialize(&Matrix4::identity(), 7);
        assert_eq!(ctrl.tracking_since(), Some(3));

        // The first desired pose is still tracked, so a sensor pose equal
        // to it gives zero error
        let mut inputs = still_inputs(3);
        inputs.sensor_pose = desired();
        ctrl.set_maximum_velocity(0.1, 0.1, 0.1).unwrap();
        ctrl.step(&inputs.as_cycle());
        assert!(ctrl.last_error().norm() < 1e-12);
    }

    #[test]
    fn test_invalid_limits() {
        let mut ctrl = SwayCtrl::default();
        ctrl.set_maximum_velocity(0.1, 0.2, 0.3).unwrap();

        match ctrl.set_maximum_velocity(0.1, -0.2, 0.3) {
            Err(SwayCtrlError::InvalidVelocityLimit { axis: "y", .. }) => (),
            r => panic!("Expected an invalid limit, got {:?}", r)
        }
        assert!(ctrl.set_maximum_velocity(f64::NAN, 0.0, 0.0).is_err());
        assert!(ctrl.set_maximum_velocity(0.0, 0.0, f64::INFINITY).is_err());

        // Previous limits kept
        assert_eq!(ctrl.velocity_limits(), &Vector3::new(0.1, 0.2, 0.3));
    }

    #[test]
    fn test_accumulators_reset_on_initialize() {
        let mut ctrl = SwayCtrl::default();
        ctrl.set_maximum_velocity(0.1, 0.1, 0.1).unwrap();
        ctrl.initialize(&desired(), 0);

        // Reference CoM velocity with no joint motion is a pure disturbance
        let mut inputs = far_inputs(3);
        inputs.ref_com_velocity = Vector3::new(0.1, 0.05, 0.0);
        for _ in 0..10 {
            ctrl.step(&inputs.as_cycle());
        }
        assert!(ctrl.integral_correction().norm() > 0.0);
        assert!(ctrl.error_accumulator().norm() > 0.0);
        assert!((ctrl.report().disturbance[0] - 0.1).abs() < 1e-12);
        assert!((ctrl.report().disturbance[1] - 0.05).abs() < 1e-12);

        ctrl.stop();
        assert!(!ctrl.is_tracking());
        ctrl.initialize(&desired(), 100);
        assert_eq!(ctrl.integral_correction(), &Vector6::zeros());
        assert_eq!(ctrl.error_accumulator(), &Vector6::zeros());
    }

    #[test]
    fn test_measured_dt() {
        let mut params = Params::default();
        params.use_measured_dt = true;
        let mut ctrl = SwayCtrl::new(params).unwrap();
        ctrl.initialize(&desired(), 0);

        // With no rotation the interaction matrix is the identity, so one
        // cycle integrates bk * dt
        let mut inputs = far_inputs(3);
        inputs.ref_com_velocity = Vector3::new(0.2, 0.0, 0.0);
        inputs.dt_s = 0.01;
        ctrl.step(&inputs.as_cycle());
        assert!((ctrl.integral_correction()[0] - 0.002).abs() < 1e-12);

        // A bad measured period falls back to the fixed step
        inputs.dt_s = -1.0;
        ctrl.step(&inputs.as_cycle());
        assert!((ctrl.integral_correction()[0] - 0.003).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_output() {
        let mut ctrl = SwayCtrl::default();
        ctrl.set_maximum_velocity(0.1, 0.1, 0.1).unwrap();
        ctrl.initialize(&desired(), 0);

        let mut inputs = far_inputs(3);
        inputs.world_to_sensor[(0, 3)] = f64::NAN;
        assert_eq!(ctrl.step(&inputs.as_cycle()), Vector3::zeros());
        assert!(ctrl.report().non_finite_output);
        assert!(ctrl.is_tracking());
    }

    #[test]
    fn test_non_finite_output_at_goal_still_converges() {
        let mut ctrl = SwayCtrl::default();
        ctrl.set_maximum_velocity(0.1, 0.1, 0.1).unwrap();
        ctrl.initialize(&desired(), 0);

        // Zero pose error, only the frame transform is broken
        let mut inputs = still_inputs(3);
        inputs.sensor_pose = desired();
        inputs.world_to_sensor[(1, 3)] = f64::NAN;

        assert_eq!(ctrl.step(&inputs.as_cycle()), Vector3::zeros());
        assert!(ctrl.report().non_finite_output);
        assert!(ctrl.report().converged);
        assert!(!ctrl.is_tracking());
    }

    /// Step a tracking controller with a corrupted sensor pose and check the
    /// cycle is rejected without touching the accumulators.
    fn assert_sensor_pose_rejected(corrupt: impl Fn(&mut Matrix4<f64>)) {
        let mut ctrl = SwayCtrl::default();
        ctrl.set_maximum_velocity(0.1, 0.1, 0.1).unwrap();
        ctrl.initialize(&desired(), 0);

        let mut inputs = far_inputs(3);
        inputs.ref_com_velocity = Vector3::new(0.1, 0.0, 0.0);
        ctrl.step(&inputs.as_cycle());
        let integral = *ctrl.integral_correction();

        corrupt(&mut inputs.sensor_pose);
        let out = ctrl.step(&inputs.as_cycle());

        assert_eq!(out, Vector3::zeros());
        assert!(ctrl.report().invalid_input);
        assert!(!ctrl.report().converged);
        assert!(ctrl.is_tracking());
        assert_eq!(ctrl.integral_correction(), &integral);
    }

    #[test]
    fn test_sensor_pose_nan_rotation() {
        assert_sensor_pose_rejected(|m| m[(0, 0)] = f64::NAN);
    }

    #[test]
    fn test_sensor_pose_nan_translation() {
        assert_sensor_pose_rejected(|m| m[(2, 3)] = f64::NAN);
    }

    #[test]
    fn test_sensor_pose_not_rigid() {
        assert_sensor_pose_rejected(|m| {
            for i in 0..3 {
                for j in 0..3 {
                    m[(i, j)] *= 2.0;
                }
            }
        });
    }

    #[test]
    fn test_non_finite_inputs_rejected() {
        let mut ctrl = SwayCtrl::default();
        ctrl.set_maximum_velocity(0.1, 0.1, 0.1).unwrap();
        ctrl.initialize(&desired(), 0);

        let mut inputs = far_inputs(3);
        inputs.ref_com_velocity[2] = f64::INFINITY;
        assert_eq!(ctrl.step(&inputs.as_cycle()), Vector3::zeros());
        assert!(ctrl.report().invalid_input);

        let mut inputs = far_inputs(3);
        inputs.joint_velocity[0] = f64::NAN;
        assert_eq!(ctrl.step(&inputs.as_cycle()), Vector3::zeros());
        assert!(ctrl.report().invalid_input);

        let mut inputs = far_inputs(3);
        inputs.com_jacobian[(1, 1)] = f64::NAN;
        assert_eq!(ctrl.step(&inputs.as_cycle()), Vector3::zeros());
        assert!(ctrl.report().invalid_input);

        // Nothing was integrated and the next good cycle moves again
        assert_eq!(ctrl.integral_correction(), &Vector6::zeros());
        assert!(ctrl.step(&far_inputs(3).as_cycle()).norm() > 0.0);
        assert!(!ctrl.report().invalid_input);
    }

    #[test]
    fn test_non_finite_desired_pose() {
        let mut ctrl = SwayCtrl::default();
        ctrl.set_maximum_velocity(0.1, 0.1, 0.1).unwrap();

        let mut bad = desired();
        bad[(1, 1)] = f64::NAN;
        ctrl.initialize(&bad, 0);

        let out = ctrl.step(&far_inputs(3).as_cycle());
        assert_eq!(out, Vector3::zeros());
        assert!(!ctrl.report().converged);
        assert!(ctrl.is_tracking());
        assert!(ctrl.integral_correction().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_handle_cmd() {
        let mut ctrl = SwayCtrl::default();

        ctrl.handle_cmd(&SwayCmd::SetMaximumVelocity {
            x_ms: 0.1, y_ms: 0.1, yaw_rads: 0.2
        }).unwrap();
        assert_eq!(ctrl.velocity_limits(), &Vector3::new(0.1, 0.1, 0.2));

        // Non rigid pose rejected
        let mut bad = desired();
        bad[(0, 0)] = 2.0;
        match ctrl.handle_cmd(&SwayCmd::initialize(&bad, 0)) {
            Err(SwayCtrlError::InvalidCmd(_)) => (),
            r => panic!("Expected an invalid command, got {:?}", r)
        }
        assert!(!ctrl.is_tracking());

        ctrl.handle_cmd(&SwayCmd::initialize(&desired(), 5)).unwrap();
        assert!(ctrl.is_tracking());

        ctrl.handle_cmd(&SwayCmd::Stop).unwrap();
        assert!(!ctrl.is_tracking());
    }

    #[test]
    fn test_invalid_params() {
        let mut params = Params::default();
        params.gain = 0.0;
        assert!(SwayCtrl::new(params).is_err());

        let mut params = Params::default();
        params.max_velocity = [0.1, -0.1, 0.1];
        assert!(SwayCtrl::new(params).is_err());

        let mut params = Params::default();
        params.max_velocity = [0.1, 0.1, 0.1];
        let ctrl = SwayCtrl::new(params).unwrap();
        assert_eq!(ctrl.velocity_limits(), &Vector3::new(0.1, 0.1, 0.1));
    }

    #[test]
    fn test_proc_and_make_safe() {
        let mut ctrl = SwayCtrl::default();
        ctrl.set_maximum_velocity(0.1, 0.1, 0.1).unwrap();
        ctrl.initialize(&desired(), 0);

        let (out, report) = ctrl.proc(&far_inputs(3)).unwrap();
        assert!(report.tracking);
        assert_eq!(report.output, [out[0], out[1], out[2]]);

        ctrl.make_safe();
        let (out, report) = ctrl.proc(&far_inputs(3)).unwrap();
        assert_eq!(out, Vector3::zeros());
        assert!(!report.tracking);
    }
}
