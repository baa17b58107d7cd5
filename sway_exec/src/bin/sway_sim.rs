//! # Sway simulation executable
//!
//! Runs SwayCtrl in closed loop against a simulated swaying base:
//!
//!     - Initialise the session, logging and the controller
//!     - Send the velocity limits and the desired pose as commands
//!     - Main loop:
//!         - Controller cycle, pulling inputs from the simulated world
//!         - Archive the controller's status
//!         - Advance the world by one cycle with the published demand
//!
//! The loop ends when the controller stops tracking or after the configured
//! maximum number of cycles.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{Report, eyre::{WrapErr, eyre}};
use log::{info, warn};
use nalgebra::Vector3;

// Internal
use sway_lib::{
    sim::{DemandLog, SimParams, SimWorld},
    sway_ctrl::{SwayCmd, SwayCtrl}
};
use util::{
    archive::Archived,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session
};

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    let session = Session::new(
        "sway_sim",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Per cycle tracing from the controller is only wanted in the archives
    logger_init(
        LevelFilter::Debug,
        &[("sway_lib::sway_ctrl", LevelFilter::Info)],
        &session
    ).wrap_err("Failed to initialise logging")?;

    info!("Sway Simulation Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let sim_params: SimParams = util::params::load("sway_sim.toml")
        .wrap_err("Could not load sim params")?;

    info!("Sim parameters loaded");

    // ---- INITIALISE MODULES ----

    let mut sway_ctrl = SwayCtrl::default();
    sway_ctrl.init("sway_ctrl.toml", &session)
        .wrap_err("Failed to initialise SwayCtrl")?;
    info!("SwayCtrl init complete");

    let mut world = SimWorld::new(sim_params.clone());
    let mut demands = DemandLog::default();

    // ---- CONFIGURE ----

    let [x_ms, y_ms, yaw_rads] = sim_params.max_velocity;
    let cmds = [
        SwayCmd::SetMaximumVelocity { x_ms, y_ms, yaw_rads },
        SwayCmd::initialize(&world.desired_pose(), 0),
    ];

    for cmd in cmds.iter() {
        sway_ctrl.handle_cmd(cmd)
            .wrap_err_with(|| format!("Failed to handle {:?}", cmd))?;
    }

    // ---- MAIN LOOP ----

    info!("Beginning main loop\n");

    let mut converged_at = None;

    for t in 0..sim_params.max_cycles {
        let output = sway_ctrl.cycle(
            t,
            sim_params.cycle_period_s,
            &world,
            &mut demands
        );

        if let Err(e) = sway_ctrl.write() {
            warn!("Could not archive SwayCtrl: {}", e);
        }

        world.advance(&output, sim_params.cycle_period_s);

        if !sway_ctrl.is_tracking() {
            converged_at = Some(t);
            break;
        }
    }

    // ---- REPORT ----

    let pose = world.base_pose();
    let goal = Vector3::from_column_slice(&sim_params.goal_pose);

    info!(
        "Final waist pose: x {:.3} m, y {:.3} m, yaw {:.3} rad (goal {:.3}, {:.3}, {:.3})",
        pose[0], pose[1], pose[2], goal[0], goal[1], goal[2]
    );
    info!(
        "Peak demand: x {:.3} m/s, y {:.3} m/s, yaw {:.3} rad/s over {} cycles",
        demands.peak[0], demands.peak[1], demands.peak[2], demands.num_published
    );

    match converged_at {
        Some(t) => {
            info!(
                "Converged after {} cycles ({:.2} s of simulated time)",
                t + 1, world.time_s()
            );
            Ok(())
        },
        None => Err(eyre!(
            "SwayCtrl did not converge within {} cycles", sim_params.max_cycles
        ))
    }
}
